//! Node identifiers.
//!
//! Every node carries a 128-bit time-ordered UUID (version 7). [`NodeId`] is
//! a newtype wrapper so an identifier cannot be confused with any other
//! string floating through the system. The canonical external form is the
//! hyphenated lowercase UUID string, which is also what the database and the
//! JSON archive store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Stable node identifier (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generates a fresh time-ordered identifier.
    pub fn generate() -> Self {
        NodeId(Uuid::now_v7())
    }

    /// The nil identifier, used for nodes that have not been initialized.
    pub fn nil() -> Self {
        NodeId(Uuid::nil())
    }

    /// Returns true if this is the nil identifier.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Parses the canonical string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(s)
            .map(NodeId)
            .map_err(|e| CoreError::BadIdentifier {
                value: s.to_string(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeId::parse(s)
    }
}
