//! Core error types for reqgraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants. The commitable
//! discipline errors (`NotChanged`, `NotDiscarded`) are programmer errors and
//! propagate to the caller unchanged; `Deserialization` is surfaced to
//! whoever requested the archive ingest.

use thiserror::Error;

use crate::id::NodeId;
use crate::kind::NodeKind;

/// Errors produced by the core graph data model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Mutation attempted on a committed node.
    #[error("node is committed, add a change node to make a change")]
    NotChanged,

    /// `discard_change` called while the change child is committed.
    #[error("cannot discard a committed change")]
    NotDiscarded,

    /// A commitable operation was invoked on a kind that is not commitable.
    #[error("kind {kind} is not commitable", kind = kind.name())]
    NotCommitable { kind: NodeKind },

    /// An operation required a different node kind.
    #[error("expected a {expected} node, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Mutation attempted on a locked organization.
    #[error("organization is locked, cannot make changes")]
    Locked,

    /// An identifier string failed to parse as a UUID.
    #[error("bad identifier '{value}': {reason}")]
    BadIdentifier { value: String, reason: String },

    /// A node id was not present in the graph arena.
    #[error("node not found in graph: {id}")]
    MissingNode { id: NodeId },

    /// A malformed or incompatible archive document.
    #[error("deserialization failed: {reason}")]
    Deserialization { reason: String },
}
