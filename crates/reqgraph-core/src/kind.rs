//! The closed set of node kinds.
//!
//! Every node is tagged with a [`NodeKind`] that discriminates its attribute
//! shape, its stable wire name, and (for persisted kinds) its database table.
//! The set is finite and known at build time; lookup by name falls back to
//! the neutral [`NodeKind::Node`] so foreign documents and foreign database
//! rows degrade to plain nodes instead of failing.

use serde::{Deserialize, Serialize};

/// Discriminant for every node kind in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// The neutral kind: an identifier plus up/down links and nothing else.
    Node,
    /// Conventional root used by graph listers.
    GraphNode,
    Organization,
    Product,
    Project,
    Requirement,
    Story,
    UseCase,
    Text,
    Completed,
    KeyValue,
    TimeEstimate,
    Effort,
    Role,
    Actor,
    Goal,
    Purpose,
    Person,
    EmailAddress,
    PhoneNumber,
    InternationalAddress,
    UsAddress,
    Event,
    RecurringTodo,
    Todo,
    /// Locator record handed out by the REST `/graphs` listing.
    ServerLocatorNode,
}

/// Every kind, in registry order.
pub const ALL_KINDS: [NodeKind; 26] = [
    NodeKind::Node,
    NodeKind::GraphNode,
    NodeKind::Organization,
    NodeKind::Product,
    NodeKind::Project,
    NodeKind::Requirement,
    NodeKind::Story,
    NodeKind::UseCase,
    NodeKind::Text,
    NodeKind::Completed,
    NodeKind::KeyValue,
    NodeKind::TimeEstimate,
    NodeKind::Effort,
    NodeKind::Role,
    NodeKind::Actor,
    NodeKind::Goal,
    NodeKind::Purpose,
    NodeKind::Person,
    NodeKind::EmailAddress,
    NodeKind::PhoneNumber,
    NodeKind::InternationalAddress,
    NodeKind::UsAddress,
    NodeKind::Event,
    NodeKind::RecurringTodo,
    NodeKind::Todo,
    NodeKind::ServerLocatorNode,
];

impl NodeKind {
    /// Stable name used in the archive and in the `node.kind_name` column.
    pub const fn name(&self) -> &'static str {
        match self {
            NodeKind::Node => "Node",
            NodeKind::GraphNode => "GraphNode",
            NodeKind::Organization => "Organization",
            NodeKind::Product => "Product",
            NodeKind::Project => "Project",
            NodeKind::Requirement => "Requirement",
            NodeKind::Story => "Story",
            NodeKind::UseCase => "UseCase",
            NodeKind::Text => "Text",
            NodeKind::Completed => "Completed",
            NodeKind::KeyValue => "KeyValue",
            NodeKind::TimeEstimate => "TimeEstimate",
            NodeKind::Effort => "Effort",
            NodeKind::Role => "Role",
            NodeKind::Actor => "Actor",
            NodeKind::Goal => "Goal",
            NodeKind::Purpose => "Purpose",
            NodeKind::Person => "Person",
            NodeKind::EmailAddress => "EmailAddress",
            NodeKind::PhoneNumber => "PhoneNumber",
            NodeKind::InternationalAddress => "InternationalAddress",
            NodeKind::UsAddress => "USAddress",
            NodeKind::Event => "Event",
            NodeKind::RecurringTodo => "RecurringTodo",
            NodeKind::Todo => "Todo",
            NodeKind::ServerLocatorNode => "ServerLocatorNode",
        }
    }

    /// Looks a kind up by its stable name.
    pub fn from_name(name: &str) -> Option<NodeKind> {
        ALL_KINDS.iter().copied().find(|k| k.name() == name)
    }

    /// Looks a kind up by name, degrading unknown names to [`NodeKind::Node`].
    pub fn from_name_or_node(name: &str) -> NodeKind {
        NodeKind::from_name(name).unwrap_or(NodeKind::Node)
    }

    /// The kind-specific table, or `None` for kinds whose only row lives in
    /// the generic `node` table.
    pub const fn table_name(&self) -> Option<&'static str> {
        match self {
            NodeKind::Node | NodeKind::ServerLocatorNode => None,
            NodeKind::GraphNode => Some("graph_node"),
            NodeKind::Organization => Some("organization"),
            NodeKind::Product => Some("product"),
            NodeKind::Project => Some("project"),
            NodeKind::Requirement => Some("requirement"),
            NodeKind::Story => Some("story"),
            NodeKind::UseCase => Some("use_case"),
            NodeKind::Text => Some("text"),
            NodeKind::Completed => Some("completed"),
            NodeKind::KeyValue => Some("keyvalue"),
            NodeKind::TimeEstimate => Some("time_estimate"),
            NodeKind::Effort => Some("effort"),
            NodeKind::Role => Some("role"),
            NodeKind::Actor => Some("actor"),
            NodeKind::Goal => Some("goal"),
            NodeKind::Purpose => Some("purpose"),
            NodeKind::Person => Some("person"),
            NodeKind::EmailAddress => Some("email_address"),
            NodeKind::PhoneNumber => Some("phone_number"),
            NodeKind::InternationalAddress => Some("international_address"),
            NodeKind::UsAddress => Some("us_address"),
            NodeKind::Event => Some("event"),
            NodeKind::RecurringTodo => Some("recurring_todo"),
            NodeKind::Todo => Some("todo"),
        }
    }

    /// Returns true for kinds that carry the commitable overlay.
    pub const fn is_commitable(&self) -> bool {
        matches!(
            self,
            NodeKind::Requirement | NodeKind::Story | NodeKind::UseCase | NodeKind::Product
        )
    }
}
