//! Shared application state for the HTTP endpoint.
//!
//! [`AppState`] carries the database handle and the worker pool. Handlers
//! clone it freely: the database handle is a path, the pool an `Arc`. All
//! durable work is enqueued on the pool; handlers never touch a connection
//! on the endpoint runtime directly.

use std::sync::Arc;

use reqgraph_store::{Database, StoreError, WorkerPool};

/// Shared state for the REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub pool: Arc<WorkerPool>,
}

impl AppState {
    /// Opens the database and starts the worker pool.
    pub fn new(db_path: &str, pool_threads: usize) -> Result<Self, StoreError> {
        let db = Database::open(db_path)?;
        let pool = WorkerPool::start(pool_threads);
        Ok(AppState { db, pool })
    }
}
