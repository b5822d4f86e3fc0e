//! Shared database handle.
//!
//! [`Database`] is a cheap, cloneable handle on the database path. Every
//! task opens its own [`Connection`] through it and runs inside its own
//! transaction, so workers never share connection state.

use std::sync::Arc;

use rusqlite::Connection;

use crate::error::StoreError;
use crate::schema;

/// Cloneable handle to the SQLite database backing a store.
#[derive(Debug, Clone)]
pub struct Database {
    path: Arc<str>,
}

impl Database {
    /// Opens (or creates) the database at `path`, applying migrations once
    /// up front so later per-task connections find the schema in place.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = Database { path: path.into() };
        // Validate the path and migrate eagerly.
        db.connect()?;
        Ok(db)
    }

    /// Opens a fresh connection for one task.
    pub fn connect(&self) -> Result<Connection, StoreError> {
        schema::open_database(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
