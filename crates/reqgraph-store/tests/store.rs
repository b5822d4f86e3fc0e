//! End-to-end tests for the persistence engine: save traversal, graph
//! factory, locator, and removal, all running as tasks on the worker pool.
//!
//! Each test owns a unique temp-file database; the [`TestDb`] guard is the
//! explicit teardown path and deletes the file (and SQLite side files) when
//! the test ends.

use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use reqgraph_core::{read_node, write_node, NodeGraph, NodeId, NodeKind, NodeRecord, Payload};
use reqgraph_store::{
    Database, GraphLocator, LoadEvent, LoadGraph, RemoveNodes, SaveEvent, SaveNodes, WorkerPool,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

struct TestDb {
    db: Database,
    path: PathBuf,
}

impl TestDb {
    fn new(prefix: &str) -> TestDb {
        let path = std::env::temp_dir().join(format!("{}_{}.db", prefix, uuid::Uuid::now_v7()));
        let db = Database::open(path.to_str().expect("temp path is not utf-8"))
            .expect("failed to open test database");
        TestDb { db, path }
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

fn wait_tree_complete(rx: &Receiver<SaveEvent>) {
    loop {
        match rx.recv_timeout(Duration::from_secs(10)) {
            Ok(SaveEvent::TreeComplete { .. }) => return,
            Ok(SaveEvent::Error { id, message }) => panic!("save of {id} failed: {message}"),
            Ok(SaveEvent::Complete { .. }) => continue,
            Err(e) => panic!("save did not complete: {e}"),
        }
    }
}

fn wait_done(rx: &Receiver<LoadEvent>) {
    loop {
        match rx.recv_timeout(Duration::from_secs(10)) {
            Ok(LoadEvent::Done { .. }) => return,
            Ok(LoadEvent::Error { id, message }) => panic!("load of {id} failed: {message}"),
            Ok(LoadEvent::Loaded { .. }) => continue,
            Err(e) => panic!("load did not complete: {e}"),
        }
    }
}

fn save_closure(db: &Database, pool: &Arc<WorkerPool>, graph: &Arc<NodeGraph>, root: NodeId) {
    let saver = SaveNodes::new(db.clone(), Arc::clone(graph), root);
    let rx = saver.subscribe();
    pool.enqueue(saver.clone());
    wait_tree_complete(&rx);
    assert!(saver.tree_save_complete());
}

fn load_graph(db: &Database, pool: &Arc<WorkerPool>, root: NodeId) -> Option<Arc<NodeGraph>> {
    let factory = LoadGraph::new(db.clone(), root);
    let rx = factory.subscribe();
    pool.enqueue(factory.clone());
    wait_done(&rx);
    assert!(factory.graph_loaded());
    factory.graph()
}

fn count(db: &Database, table: &str) -> i64 {
    let conn = db.connect().unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

// ---------------------------------------------------------------------------
// Save and reload
// ---------------------------------------------------------------------------

#[test]
fn save_closure_then_reload_from_organization_root() {
    let test = TestDb::new("save_reload");
    let pool = WorkerPool::start(3);

    let mut graph = NodeGraph::new();
    let org = graph.add(NodeRecord::organization("GCSE,Inc"));
    let project = graph.add(NodeRecord::project("Engineer", "engineering"));
    let product = graph.add(NodeRecord::product("Some SW", "a product"));
    let req_a = graph.add(NodeRecord::requirement("Must be software", ""));
    let req_b = graph.add(NodeRecord::requirement("Must be engineered", ""));
    graph.connect(org, project).unwrap();
    graph.connect(project, product).unwrap();
    graph.connect(product, req_a).unwrap();
    graph.connect(product, req_b).unwrap();
    let graph = Arc::new(graph);

    // Saving from the middle of the graph covers the whole closure.
    save_closure(&test.db, &pool, &graph, product);

    let loaded = load_graph(&test.db, &pool, org).expect("organization graph should load");
    assert_eq!(loaded.len(), 5);

    let org_handle = loaded.node(org).unwrap();
    let org_record = read_node(&org_handle);
    assert!(org_record.is_initialized());
    assert!(!org_record.is_changed());
    assert_eq!(org_record.down, vec![project]);
    match org_record.payload() {
        Payload::Organization(d) => assert_eq!(d.name(), "GCSE,Inc"),
        _ => unreachable!(),
    }

    let project_record_ref = loaded.node(project).unwrap();
    let project_record = read_node(&project_record_ref);
    assert_eq!(project_record.kind(), NodeKind::Project);
    assert_eq!(project_record.down, vec![product]);

    let product_record_ref = loaded.node(product).unwrap();
    let product_record = read_node(&product_record_ref);
    assert_eq!(product_record.kind(), NodeKind::Product);
    let mut titles = Vec::new();
    for req in &product_record.down {
        match read_node(&loaded.node(*req).unwrap()).payload() {
            Payload::Requirement(c) => titles.push(c.data().title.clone()),
            other => panic!("expected requirement, got {:?}", other.kind()),
        }
    }
    titles.sort();
    assert_eq!(titles, vec!["Must be engineered", "Must be software"]);

    pool.shutdown();
    pool.join();
}

#[test]
fn reloaded_graph_edges_match_memory_exactly() {
    let test = TestDb::new("edge_exact");
    let pool = WorkerPool::start(2);

    let mut graph = NodeGraph::new();
    let a = graph.add(NodeRecord::text("a"));
    let b = graph.add(NodeRecord::text("b"));
    let c = graph.add(NodeRecord::text("c"));
    graph.connect(a, b).unwrap();
    graph.connect(a, c).unwrap();
    let graph = Arc::new(graph);
    save_closure(&test.db, &pool, &graph, a);

    // Drop one link, mark the node changed, save again: the stored edge
    // set must match memory with no stale survivors.
    {
        let handle = graph.node(a).unwrap();
        let mut record = write_node(&handle);
        record.down.retain(|n| *n != b);
        record.mark_changed();
    }
    save_closure(&test.db, &pool, &graph, a);

    let loaded = load_graph(&test.db, &pool, a).unwrap();
    let record_ref = loaded.node(a).unwrap();
    let record = read_node(&record_ref);
    assert_eq!(record.down, vec![c]);

    pool.shutdown();
    pool.join();
}

#[test]
fn unchanged_single_node_save_still_rewrites_edges() {
    let test = TestDb::new("single_edges");
    let pool = WorkerPool::start(2);

    let mut graph = NodeGraph::new();
    let node = graph.add(NodeRecord::text("t"));
    let first = graph.add(NodeRecord::text("n1"));
    graph.connect(node, first).unwrap();
    let graph = Arc::new(graph);

    let saver = SaveNodes::single(test.db.clone(), Arc::clone(&graph), node);
    let rx = saver.subscribe();
    pool.enqueue(saver);
    wait_tree_complete(&rx);

    // The dirty flag is now clear. Adding a link does not flip it, yet a
    // visited node's edges are still rewritten.
    let second = NodeId::generate();
    {
        let handle = graph.node(node).unwrap();
        let mut record = write_node(&handle);
        assert!(!record.is_changed());
        record.add_down(second);
    }
    let saver = SaveNodes::single(test.db.clone(), Arc::clone(&graph), node);
    let rx = saver.subscribe();
    pool.enqueue(saver);
    wait_tree_complete(&rx);

    let conn = test.db.connect().unwrap();
    let edges: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM node_associations WHERE id = ?1",
            [node.to_string()],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(edges, 2);
    // Neighbor identifiers are not required to exist in the node table.
    let missing: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM node WHERE id = ?1",
            [second.to_string()],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(missing, 0);

    pool.shutdown();
    pool.join();
}

#[test]
fn clean_nodes_skip_their_kind_row() {
    let test = TestDb::new("clean_skip");
    let pool = WorkerPool::start(2);

    let mut graph = NodeGraph::new();
    let node = graph.add(NodeRecord::text("first"));
    let graph = Arc::new(graph);
    save_closure(&test.db, &pool, &graph, node);

    // Mutate the payload without marking the node changed (loader-style).
    {
        let handle = graph.node(node).unwrap();
        let mut record = write_node(&handle);
        if let Payload::Text(d) = record.payload_raw_mut() {
            d.text = "second".into();
        }
    }
    save_closure(&test.db, &pool, &graph, node);

    // The kind row still holds the first value: clean nodes are not
    // rewritten.
    let conn = test.db.connect().unwrap();
    let stored: String = conn
        .query_row(
            "SELECT text FROM text WHERE id = ?1",
            [node.to_string()],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(stored, "first");

    pool.shutdown();
    pool.join();
}

// ---------------------------------------------------------------------------
// Cycles, overlays, unknown kinds
// ---------------------------------------------------------------------------

#[test]
fn cyclic_graphs_save_and_reload() {
    let test = TestDb::new("cycle");
    let pool = WorkerPool::start(2);

    let mut graph = NodeGraph::new();
    let a = graph.add(NodeRecord::text("a"));
    let b = graph.add(NodeRecord::text("b"));
    graph.connect(a, b).unwrap();
    graph.connect(b, a).unwrap();
    let graph = Arc::new(graph);
    save_closure(&test.db, &pool, &graph, a);

    let loaded = load_graph(&test.db, &pool, a).unwrap();
    assert_eq!(loaded.len(), 2);
    let a_record_ref = loaded.node(a).unwrap();
    let a_record = read_node(&a_record_ref);
    assert_eq!(a_record.down, vec![b]);
    assert_eq!(a_record.up, vec![b]);

    pool.shutdown();
    pool.join();
}

#[test]
fn address_lines_column_and_edges_stay_consistent() {
    let test = TestDb::new("address");
    let pool = WorkerPool::start(2);

    let mut graph = NodeGraph::new();
    let lines = graph.add(NodeRecord::text("221B Baker Street"));
    let mut address = NodeRecord::new(Payload::blank(NodeKind::InternationalAddress));
    if let Payload::InternationalAddress(d) = address.payload_mut() {
        d.country_code = "GB".into();
        d.locality = "London".into();
        d.postal_code = "NW1 6XE".into();
    }
    let address = graph.add(address);
    {
        let handle = graph.node(address).unwrap();
        write_node(&handle).set_address_lines(lines).unwrap();
    }
    let graph = Arc::new(graph);
    save_closure(&test.db, &pool, &graph, address);

    let loaded = load_graph(&test.db, &pool, address).unwrap();
    let record_ref = loaded.node(address).unwrap();
    let record = read_node(&record_ref);
    assert_eq!(record.payload().address_lines(), Some(lines));
    assert_eq!(record.down, vec![lines]);
    match read_node(&loaded.node(lines).unwrap()).payload() {
        Payload::Text(d) => assert_eq!(d.text, "221B Baker Street"),
        _ => unreachable!(),
    }

    pool.shutdown();
    pool.join();
}

#[test]
fn commit_chain_nodes_are_saved_with_the_closure() {
    let test = TestDb::new("commit_chain");
    let pool = WorkerPool::start(2);

    let mut graph = NodeGraph::new();
    let req = graph.add(NodeRecord::requirement("original", "text"));
    {
        let handle = graph.node(req).unwrap();
        write_node(&handle).payload_mut().commit().unwrap();
    }
    let change = graph.change_node(req).unwrap();
    let graph = Arc::new(graph);
    save_closure(&test.db, &pool, &graph, req);

    // Both ends of the change chain are in the store.
    let conn = test.db.connect().unwrap();
    for id in [req, change] {
        let found: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM requirement WHERE id = ?1",
                [id.to_string()],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(found, 1, "missing requirement row for {id}");
    }

    pool.shutdown();
    pool.join();
}

#[test]
fn unknown_stored_kind_loads_as_neutral_node() {
    let test = TestDb::new("unknown_kind");
    let pool = WorkerPool::start(2);

    let root = NodeId::generate();
    let child = NodeId::generate();
    {
        let conn = test.db.connect().unwrap();
        conn.execute(
            "INSERT INTO node (id, kind_name) VALUES (?1, 'Martian')",
            [root.to_string()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO node (id, kind_name) VALUES (?1, 'Text')",
            [child.to_string()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO node_associations (id, neighbor, direction) VALUES (?1, ?2, 'down')",
            [root.to_string(), child.to_string()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO text (id, text) VALUES (?1, 'hello')",
            [child.to_string()],
        )
        .unwrap();
    }

    let loaded = load_graph(&test.db, &pool, root).unwrap();
    let record_ref = loaded.node(root).unwrap();
    let record = read_node(&record_ref);
    assert_eq!(record.kind(), NodeKind::Node);
    assert!(record.is_initialized());
    assert_eq!(record.down, vec![child]);
    match read_node(&loaded.node(child).unwrap()).payload() {
        Payload::Text(d) => assert_eq!(d.text, "hello"),
        _ => unreachable!(),
    }

    pool.shutdown();
    pool.join();
}

#[test]
fn loading_an_absent_root_yields_no_graph() {
    let test = TestDb::new("absent_root");
    let pool = WorkerPool::start(2);
    assert!(load_graph(&test.db, &pool, NodeId::generate()).is_none());
    pool.shutdown();
    pool.join();
}

// ---------------------------------------------------------------------------
// Listing and removal
// ---------------------------------------------------------------------------

#[test]
fn locator_lists_saved_graph_roots() {
    let test = TestDb::new("locator");
    let pool = WorkerPool::start(2);

    let mut graph = NodeGraph::new();
    let root = graph.add(NodeRecord::graph_node("My Plan"));
    let org = graph.add(NodeRecord::organization("org"));
    graph.connect(root, org).unwrap();
    let graph = Arc::new(graph);
    save_closure(&test.db, &pool, &graph, root);

    let listings = GraphLocator::new(test.db.clone()).query().unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].id, root);
    assert_eq!(listings[0].title, "My Plan");

    pool.shutdown();
    pool.join();
}

#[test]
fn remove_task_deletes_closures() {
    let test = TestDb::new("remove");
    let pool = WorkerPool::start(2);

    let mut graph = NodeGraph::new();
    let root = graph.add(NodeRecord::graph_node("doomed"));
    let child = graph.add(NodeRecord::text("child"));
    graph.connect(root, child).unwrap();
    let graph = Arc::new(graph);
    save_closure(&test.db, &pool, &graph, root);
    assert_eq!(count(&test.db, "node"), 2);

    pool.enqueue(RemoveNodes::new(
        test.db.clone(),
        Arc::clone(&graph),
        vec![root],
    ));
    pool.shutdown();
    pool.join();

    assert_eq!(count(&test.db, "node"), 0);
    assert_eq!(count(&test.db, "node_associations"), 0);
    assert_eq!(count(&test.db, "graph_node"), 0);
    assert_eq!(count(&test.db, "text"), 0);
}
