//! Graph listing.
//!
//! [`GraphLocator`] reads the `graph_node` projection (identifier, title)
//! so frontends can offer the available graphs without loading any of them.

use reqgraph_core::NodeId;

use crate::database::Database;
use crate::error::StoreError;

/// One row of the graph listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphListing {
    pub id: NodeId,
    pub title: String,
}

/// Queries the stored graph roots.
pub struct GraphLocator {
    db: Database,
}

impl GraphLocator {
    pub fn new(db: Database) -> Self {
        GraphLocator { db }
    }

    /// Loads the listing fresh from the store.
    pub fn query(&self) -> Result<Vec<GraphListing>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare("SELECT id, title FROM graph_node ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            Ok((id, title))
        })?;
        let mut result = Vec::new();
        for row in rows {
            let (id, title) = row?;
            match NodeId::parse(&id) {
                Ok(id) => result.push(GraphListing { id, title }),
                Err(e) => tracing::warn!("skipping graph_node row with bad id: {e}"),
            }
        }
        Ok(result)
    }
}
