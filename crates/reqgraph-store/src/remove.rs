//! Node and graph removal.
//!
//! [`RemoveNodes`] deletes nodes from the store. Seed nodes are handed to
//! the task up front; each seed's reachable closure is traversed and every
//! node met is removed through its codec (edges on either side, the node
//! row, the kind row). There is no completion signal: joining the pool is
//! the barrier.

use std::collections::HashSet;
use std::sync::Arc;

use reqgraph_core::{read_node, NodeGraph, NodeId};

use crate::codec;
use crate::database::Database;
use crate::error::StoreError;
use crate::pool::{Task, WorkerPool};

/// Task that removes the reachable closures of its seed nodes.
pub struct RemoveNodes {
    db: Database,
    graph: Arc<NodeGraph>,
    seeds: Vec<NodeId>,
}

impl RemoveNodes {
    pub fn new(db: Database, graph: Arc<NodeGraph>, seeds: Vec<NodeId>) -> Arc<RemoveNodes> {
        Arc::new(RemoveNodes { db, graph, seeds })
    }

    fn remove_all(&self) -> Result<(), StoreError> {
        let mut conn = self.db.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        // One shared visited set: overlapping seed closures remove once.
        let mut visited = HashSet::new();
        for seed in &self.seeds {
            let mut targets = Vec::new();
            self.graph.traverse_with(*seed, &mut visited, &mut |record| {
                targets.push(record.id());
            });
            for id in targets {
                if let Some(handle) = self.graph.node(id) {
                    let record = read_node(&handle);
                    tracing::debug!("removing {} ({})", record.id(), record.kind_name());
                    codec::remove_node(&tx, &record)?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }
}

impl Task for RemoveNodes {
    fn run(&self, _pool: &Arc<WorkerPool>) {
        if let Err(e) = self.remove_all() {
            tracing::error!("remove task failed: {e}");
        }
    }
}
