//! Storage error types for reqgraph-store.
//!
//! [`StoreError`] covers the anticipated failure modes of the persistence
//! layer. Database failures inside a task abort that task's transaction and
//! propagate; the owning worker survives and keeps draining the queue.

use thiserror::Error;

use reqgraph_core::CoreError;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite call failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A per-kind codec write was invoked for a kind with no kind table.
    #[error("unknown kind for store codec: {kind}")]
    UnknownKind { kind: &'static str },

    /// An error bubbled up from the core data model.
    #[error(transparent)]
    Core(#[from] CoreError),
}
