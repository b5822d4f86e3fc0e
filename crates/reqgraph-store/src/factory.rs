//! The graph factory.
//!
//! [`LoadGraph`] reconstructs a whole graph from a single root identifier.
//! The factory task looks the root's kind up, allocates a blank node with
//! the identifier pre-set, and walks `node_associations` to resolve edges,
//! memoizing visited identifiers so shared references and cycles collapse
//! onto one record. Per-node field loads run as [`LoadNode`] tasks on
//! sibling workers while the factory keeps wiring; edge resolution itself
//! stays on the factory task inside one transaction, so the assembled
//! closure is consistent.
//!
//! An unknown `kind_name` falls back to a neutral node with the identifier
//! set, never a missing record, so edge wiring still succeeds.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};

use reqgraph_core::{write_node, NodeGraph, NodeHandle, NodeId, NodeKind, NodeRecord, Payload};

use crate::codec::{self, Direction};
use crate::database::Database;
use crate::error::StoreError;
use crate::pool::{Task, WorkerPool};
use crate::signal::Signal;

/// Load progress notifications.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    /// One node's kind-specific fields were populated.
    Loaded { id: NodeId },
    /// The factory and every spawned loader have finished.
    Done { root: NodeId },
    /// A task failed; the load may be incomplete.
    Error { id: NodeId, message: String },
}

/// Task that reconstructs a graph from a root identifier.
pub struct LoadGraph {
    db: Database,
    root: NodeId,
    events: Arc<Signal<LoadEvent>>,
    outstanding: Arc<AtomicUsize>,
    result: Mutex<Option<Arc<NodeGraph>>>,
}

impl LoadGraph {
    pub fn new(db: Database, root: NodeId) -> Arc<LoadGraph> {
        Arc::new(LoadGraph {
            db,
            root,
            events: Arc::new(Signal::new()),
            outstanding: Arc::new(AtomicUsize::new(1)),
            result: Mutex::new(None),
        })
    }

    /// Subscribes to this load's events.
    pub fn subscribe(&self) -> Receiver<LoadEvent> {
        self.events.subscribe()
    }

    /// The assembled graph. `None` until `Done` fires, and `None` after
    /// `Done` when the root identifier was absent from the store.
    pub fn graph(&self) -> Option<Arc<NodeGraph>> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True once the factory and every spawned loader have finished.
    pub fn graph_loaded(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }

    /// Allocates a blank node of the stored kind with the identifier and
    /// initialized bit pre-set, and schedules its field load.
    fn allocate(
        &self,
        graph: &mut NodeGraph,
        kind_name: &str,
        id: NodeId,
        pool: &Arc<WorkerPool>,
    ) {
        let kind = NodeKind::from_name_or_node(kind_name);
        if kind == NodeKind::Node && kind_name != NodeKind::Node.name() {
            tracing::warn!("unknown kind name '{kind_name}' for {id}, loading a neutral node");
        }
        let mut record = NodeRecord::new(Payload::blank(kind));
        record.set_id(id);
        record.clear_changed();
        graph.add(record);
        if let Some(handle) = graph.node(id) {
            self.outstanding.fetch_add(1, Ordering::SeqCst);
            pool.enqueue(Arc::new(LoadNode {
                db: self.db.clone(),
                handle,
                id,
                root: self.root,
                events: Arc::clone(&self.events),
                outstanding: Arc::clone(&self.outstanding),
            }));
        }
    }

    fn assemble(&self, pool: &Arc<WorkerPool>) -> Result<Option<NodeGraph>, StoreError> {
        let mut conn = self.db.connect()?;
        // One transaction covers every edge-resolution query, so the
        // factory observes a consistent closure.
        let tx = conn.transaction()?;

        let Some(kind_name) = codec::node_kind_name(&tx, self.root)? else {
            tracing::debug!("graph root {} is not in the store", self.root);
            return Ok(None);
        };

        let mut graph = NodeGraph::new();
        self.allocate(&mut graph, &kind_name, self.root, pool);

        let mut pending = vec![self.root];
        let mut processed = HashSet::new();
        while let Some(id) = pending.pop() {
            if !processed.insert(id) {
                continue;
            }
            for (neighbor, direction) in codec::associations(&tx, id)? {
                if !graph.contains(neighbor) {
                    match codec::node_kind_name(&tx, neighbor)? {
                        Some(name) => self.allocate(&mut graph, &name, neighbor, pool),
                        None => {
                            // No node row: keep the identifier alive as a
                            // neutral node so adjacency survives.
                            let mut record = NodeRecord::plain();
                            record.set_id(neighbor);
                            record.clear_changed();
                            graph.add(record);
                        }
                    }
                    pending.push(neighbor);
                }
                let Some(handle) = graph.node(id) else {
                    continue;
                };
                let mut record = write_node(&handle);
                match direction {
                    Direction::Up => record.add_up(neighbor),
                    Direction::Down => record.add_down(neighbor),
                };
            }
        }

        Ok(Some(graph))
    }
}

impl Task for LoadGraph {
    fn run(&self, pool: &Arc<WorkerPool>) {
        match self.assemble(pool) {
            Ok(graph) => {
                *self.result.lock().unwrap_or_else(PoisonError::into_inner) =
                    graph.map(Arc::new);
            }
            Err(e) => {
                tracing::error!("loading graph {} failed: {e}", self.root);
                self.events.emit(LoadEvent::Error {
                    id: self.root,
                    message: e.to_string(),
                });
            }
        }
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.events.emit(LoadEvent::Done { root: self.root });
        }
    }
}

/// Task that populates one node's kind-specific fields.
struct LoadNode {
    db: Database,
    handle: NodeHandle,
    id: NodeId,
    root: NodeId,
    events: Arc<Signal<LoadEvent>>,
    outstanding: Arc<AtomicUsize>,
}

impl LoadNode {
    fn load(&self) -> Result<bool, StoreError> {
        let mut conn = self.db.connect()?;
        let tx = conn.transaction()?;
        let mut record = write_node(&self.handle);
        let found = codec::load_node(&tx, &mut record)?;
        // A loaded record mirrors the store.
        record.clear_changed();
        Ok(found)
    }
}

impl Task for LoadNode {
    fn run(&self, _pool: &Arc<WorkerPool>) {
        match self.load() {
            Ok(found) => {
                if !found {
                    // Not an error: raw nodes have no kind row.
                    tracing::debug!("no kind-specific row for {}", self.id);
                }
                self.events.emit(LoadEvent::Loaded { id: self.id });
            }
            Err(e) => {
                tracing::error!("loading node {} failed: {e}", self.id);
                self.events.emit(LoadEvent::Error {
                    id: self.id,
                    message: e.to_string(),
                });
            }
        }
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.events.emit(LoadEvent::Done { root: self.root });
        }
    }
}
