//! End-to-end tests for the REST surface.
//!
//! Tests drive the router in-process via `tower::ServiceExt::oneshot`; no
//! network listener is started. Each test owns a unique temp-file database
//! with an explicit teardown guard. Because `POST /graph/{id}` is
//! fire-and-forget, tests poll the read side until the save lands.

use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use reqgraph_core::{archive, NodeGraph, NodeRecord};
use reqgraph_server::{build_router, AppState};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

struct TestApp {
    state: AppState,
    router: Router,
    path: PathBuf,
}

impl TestApp {
    fn new(prefix: &str) -> TestApp {
        let path = std::env::temp_dir().join(format!("{}_{}.db", prefix, uuid::Uuid::now_v7()));
        let state = AppState::new(path.to_str().expect("temp path is not utf-8"), 2)
            .expect("failed to create AppState");
        let router = build_router(state.clone());
        TestApp {
            state,
            router,
            path,
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.state.pool.shutdown();
        self.state.pool.join();
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

async fn get(router: &Router, path: &str) -> (StatusCode, String) {
    get_with_headers(router, path, &[]).await
}

async fn get_with_headers(
    router: &Router,
    path: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, String) {
    let mut builder = Request::builder().uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap_or_default())
}

async fn post(router: &Router, path: &str, body: String) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap_or_default())
}

/// Polls a GET until it answers 200, returning the parsed body. The write
/// side is asynchronous, so the first few probes may 404.
async fn poll_until_ok(router: &Router, path: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = get(router, path).await;
        if status == StatusCode::OK {
            return serde_json::from_str(&body).expect("response body is not JSON");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("GET {path} never answered 200");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn post_then_get_returns_the_same_graph() {
    let app = TestApp::new("rest_roundtrip");

    let mut graph = NodeGraph::new();
    let org = graph.add(NodeRecord::organization("GCSE,Inc"));
    let project = graph.add(NodeRecord::project("Engineer", ""));
    let requirement = graph.add(NodeRecord::requirement("Must be software", "sw"));
    graph.connect(org, project).unwrap();
    graph.connect(project, requirement).unwrap();
    let document = archive::to_json_string(&graph, org).unwrap();

    let (status, body) = post(&app.router, &format!("/graph/{org}"), document).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    // The save is asynchronous and lands node by node; poll until the
    // fetched document has taken its full shape.
    let mut fetched = Value::Null;
    for _ in 0..200 {
        let (status, body) = get(&app.router, &format!("/graph/{org}")).await;
        if status == StatusCode::OK {
            fetched = serde_json::from_str(&body).expect("graph body is not JSON");
            if fetched["Organization"]["downList"][0]["Project"].is_object() {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let org_body = fetched
        .get("Organization")
        .and_then(Value::as_object)
        .expect("root entry should be an Organization");
    assert_eq!(org_body.get("id").unwrap(), &Value::String(org.to_string()));
    assert_eq!(org_body.get("name").unwrap(), "GCSE,Inc");

    // The immediate down-links of the posted root come back.
    let down = org_body.get("downList").and_then(Value::as_array).unwrap();
    assert_eq!(down.len(), 1);
    let project_body = down[0].get("Project").and_then(Value::as_object).unwrap();
    assert_eq!(
        project_body.get("id").unwrap(),
        &Value::String(project.to_string())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn graphs_listing_returns_locator_records() {
    let app = TestApp::new("rest_listing");

    let mut graph = NodeGraph::new();
    let root = graph.add(NodeRecord::graph_node("Plan of Record"));
    let child = graph.add(NodeRecord::text("contents"));
    graph.connect(root, child).unwrap();
    let document = archive::to_json_string(&graph, root).unwrap();

    let (status, _) = post(&app.router, &format!("/graph/{root}"), document).await;
    assert_eq!(status, StatusCode::OK);

    // Poll until the asynchronous save lands in the listing.
    let mut listing = Value::Null;
    for _ in 0..200 {
        listing = poll_until_ok(&app.router, "/graphs").await;
        if listing.as_array().is_some_and(|a| !a.is_empty()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let entries = listing.as_array().expect("listing should be an array");
    assert_eq!(entries.len(), 1);
    let locator = entries[0]
        .get("ServerLocatorNode")
        .and_then(Value::as_object)
        .expect("listing entries are ServerLocatorNode records");
    assert_eq!(
        locator.get("graphUuid").unwrap(),
        &Value::String(root.to_string())
    );
    assert_eq!(locator.get("graphTitle").unwrap(), "Plan of Record");
    let address = locator.get("graphAddress").and_then(Value::as_str).unwrap();
    assert!(address.starts_with("http://"));
    assert!(address.ends_with(&format!("/graph/{root}")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forwarded_proto_switches_locator_scheme() {
    let app = TestApp::new("rest_proto");

    let mut graph = NodeGraph::new();
    let root = graph.add(NodeRecord::graph_node("Secure"));
    let document = archive::to_json_string(&graph, root).unwrap();
    post(&app.router, &format!("/graph/{root}"), document).await;

    for _ in 0..200 {
        let (status, body) = get_with_headers(
            &app.router,
            "/graphs",
            &[("x-forwarded-proto", "https"), ("host", "example.com:443")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let listing: Value = serde_json::from_str(&body).unwrap();
        if let Some(entry) = listing.as_array().and_then(|a| a.first()) {
            let address = entry["ServerLocatorNode"]["graphAddress"].as_str().unwrap();
            assert!(address.starts_with("https://example.com:443/graph/"));
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("listing never became non-empty");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_graph_id_is_not_found() {
    let app = TestApp::new("rest_404");
    let absent = uuid::Uuid::now_v7();
    let (status, _) = get(&app.router, &format!("/graph/{absent}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_or_bad_ids_are_bad_requests() {
    let app = TestApp::new("rest_400_id");
    let (status, _) = get(&app.router, "/graph").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app.router, "/graph/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_body_is_a_bad_request() {
    let app = TestApp::new("rest_400_body");
    let id = uuid::Uuid::now_v7();
    let (status, _) = post(&app.router, &format!("/graph/{id}"), "{not json".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = post(&app.router, &format!("/graph/{id}"), "[1, 2, 3]".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
