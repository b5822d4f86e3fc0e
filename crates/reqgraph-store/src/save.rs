//! The save traversal.
//!
//! [`SaveNodes`] persists one node or the reachable closure from one node.
//! In closure mode the task walks up, down, and overlay references,
//! memoizing visited identifiers, and schedules a single-node save task on
//! the pool for every fresh node it meets. Each task owns its own
//! connection and transaction and commits when done.
//!
//! A node's kind-specific row is only written when its dirty flag is set;
//! the flag is cleared just before the write so the stored row captures the
//! post-save state. A visited node whose flag is clear still gets its node
//! row ensured and its edge rows rewritten, so the store's edge set always
//! matches memory after a save.
//!
//! Every task emits `Complete` for its own root; the whole tree shares one
//! signal and an outstanding-task counter, and the last task to finish
//! emits `TreeComplete`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use reqgraph_core::{read_node, write_node, NodeGraph, NodeId};

use crate::codec;
use crate::database::Database;
use crate::error::StoreError;
use crate::pool::{Task, WorkerPool};
use crate::signal::Signal;

/// Save progress notifications.
#[derive(Debug, Clone)]
pub enum SaveEvent {
    /// One node's own save finished.
    Complete { id: NodeId },
    /// Every task spawned for the tree has finished.
    TreeComplete { root: NodeId },
    /// A task failed; its transaction was rolled back.
    Error { id: NodeId, message: String },
}

/// Task that saves one node or a reachable closure.
pub struct SaveNodes {
    db: Database,
    graph: Arc<NodeGraph>,
    root: NodeId,
    single: bool,
    tree_root: NodeId,
    events: Arc<Signal<SaveEvent>>,
    outstanding: Arc<AtomicUsize>,
}

impl SaveNodes {
    /// Saves the reachable closure from `root`.
    pub fn new(db: Database, graph: Arc<NodeGraph>, root: NodeId) -> Arc<SaveNodes> {
        Arc::new(SaveNodes {
            db,
            graph,
            root,
            single: false,
            tree_root: root,
            events: Arc::new(Signal::new()),
            outstanding: Arc::new(AtomicUsize::new(1)),
        })
    }

    /// Saves this one node only. The node's immediate edges are still
    /// rewritten, but the walk does not continue into its neighbors.
    pub fn single(db: Database, graph: Arc<NodeGraph>, root: NodeId) -> Arc<SaveNodes> {
        Arc::new(SaveNodes {
            db,
            graph,
            root,
            single: true,
            tree_root: root,
            events: Arc::new(Signal::new()),
            outstanding: Arc::new(AtomicUsize::new(1)),
        })
    }

    /// Subscribes to this tree's save events.
    pub fn subscribe(&self) -> Receiver<SaveEvent> {
        self.events.subscribe()
    }

    /// True once every task spawned for the tree has finished.
    pub fn tree_save_complete(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }

    /// A nested single-node save sharing this tree's signal and counter.
    fn nested(&self, node: NodeId) -> Arc<SaveNodes> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Arc::new(SaveNodes {
            db: self.db.clone(),
            graph: Arc::clone(&self.graph),
            root: node,
            single: true,
            tree_root: self.tree_root,
            events: Arc::clone(&self.events),
            outstanding: Arc::clone(&self.outstanding),
        })
    }

    fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        match self.graph.node(id) {
            Some(handle) => {
                let record = read_node(&handle);
                record
                    .up
                    .iter()
                    .chain(record.down.iter())
                    .copied()
                    .chain(record.payload().extra_refs())
                    .collect()
            }
            None => Vec::new(),
        }
    }

    fn save(&self, pool: &Arc<WorkerPool>) -> Result<(), StoreError> {
        let Some(handle) = self.graph.node(self.root) else {
            tracing::debug!("save root {} has no record in the graph", self.root);
            return Ok(());
        };

        let mut conn = self.db.connect()?;
        // Immediate: take the write lock at BEGIN so parallel save tasks
        // queue on the busy timeout instead of failing on lock upgrade.
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        {
            let mut record = write_node(&handle);
            if record.is_changed() {
                // Clear before the kind-specific write so the stored row
                // captures the post-save state.
                record.clear_changed();
                tracing::debug!("saving {} ({})", record.id(), record.kind_name());
                codec::store_node(&tx, &record)?;
            } else if self.single {
                codec::store_edges(&tx, &record)?;
            }
        }

        if !self.single {
            let mut visited = HashSet::new();
            visited.insert(self.root);
            let mut stack = self.neighbors(self.root);
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }
                if self.graph.node(id).is_none() {
                    continue;
                }
                stack.extend(self.neighbors(id));
                pool.enqueue(self.nested(id));
            }
        }

        tx.commit()?;
        self.events.emit(SaveEvent::Complete { id: self.root });
        Ok(())
    }
}

impl Task for SaveNodes {
    fn run(&self, pool: &Arc<WorkerPool>) {
        if let Err(e) = self.save(pool) {
            tracing::error!("save of {} failed: {e}", self.root);
            self.events.emit(SaveEvent::Error {
                id: self.root,
                message: e.to_string(),
            });
        }
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.events.emit(SaveEvent::TreeComplete {
                root: self.tree_root,
            });
        }
    }
}
