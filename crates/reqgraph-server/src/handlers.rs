//! REST handlers: list graphs, fetch one graph, store one graph.
//!
//! Fetching is synchronous: the handler enqueues a graph factory task and
//! blocks (inside `spawn_blocking`, off the endpoint runtime) until the
//! factory signals done. Storing is fire-and-forget: the body is ingested,
//! a save traversal is enqueued, and the response returns immediately.

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::sync::Arc;

use reqgraph_core::{archive, NodeId, NodeRecord};
use reqgraph_store::{GraphLocator, LoadEvent, LoadGraph, SaveNodes};

use crate::error::ApiError;
use crate::state::AppState;

/// Builds the external base URL for locator records from the request
/// headers. `X-Forwarded-Proto` marks an https connection terminated by a
/// reverse proxy in front of us.
fn base_url(headers: &HeaderMap) -> String {
    let scheme = match headers.get("x-forwarded-proto").and_then(|v| v.to_str().ok()) {
        Some("https") => "https",
        _ => "http",
    };
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

/// Lists the stored graphs as locator records.
///
/// `GET /graphs`
pub async fn list_graphs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let base = base_url(&headers);
    let db = state.db.clone();
    let listings = tokio::task::spawn_blocking(move || GraphLocator::new(db).query())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let mut locators = Vec::with_capacity(listings.len());
    for listing in listings {
        let mut node = NodeRecord::server_locator(
            listing.id.to_string(),
            listing.title,
            format!("{base}/graph/{}", listing.id),
        );
        node.init();
        locators.push(archive::record_to_json(&node));
    }
    Ok(Json(Value::Array(locators)))
}

/// Loads the whole graph rooted at `id` and returns its archive document.
///
/// `GET /graph/{id}`: 404 when the id is absent, 400 when it is empty or
/// not an identifier.
pub async fn get_graph(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::BadRequest("empty graph id".into()));
    }
    let root = NodeId::parse(&id).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let body = tokio::task::spawn_blocking(move || fetch_graph(&state, root))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    match body {
        Some(json) => Ok(([(CONTENT_TYPE, "application/json")], json).into_response()),
        None => Err(ApiError::NotFound(format!("no graph with id {root}"))),
    }
}

/// Runs a graph factory on the pool and blocks until it reports done.
fn fetch_graph(state: &AppState, root: NodeId) -> Result<Option<String>, ApiError> {
    let factory = LoadGraph::new(state.db.clone(), root);
    let events = factory.subscribe();
    state.pool.enqueue(factory.clone());

    loop {
        match events.recv() {
            Ok(LoadEvent::Done { .. }) => break,
            Ok(LoadEvent::Error { message, .. }) => {
                return Err(ApiError::Internal(message));
            }
            Ok(LoadEvent::Loaded { .. }) => continue,
            Err(_) => {
                return Err(ApiError::Internal("graph load was abandoned".into()));
            }
        }
    }

    let Some(graph) = factory.graph() else {
        return Ok(None);
    };
    let json = archive::to_json_string(&graph, root)?;
    Ok(Some(json))
}

/// Ingests the body as a graph archive and enqueues a save traversal.
///
/// `POST /graph/{id}`: returns `200 "OK"` once the save is enqueued; the
/// write itself happens on the worker pool.
pub async fn post_graph(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Result<&'static str, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::BadRequest("empty graph id".into()));
    }
    let (graph, root) =
        archive::from_json_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::debug!("enqueueing save for posted graph {root}");
    let saver = SaveNodes::new(state.db.clone(), Arc::new(graph), root);
    state.pool.enqueue(saver);
    Ok("OK")
}

/// Route guard for `/graph` with no id segment.
pub async fn missing_id() -> ApiError {
    ApiError::BadRequest("empty graph id".into())
}
