//! Per-kind node payloads.
//!
//! [`Payload`] is the closed sum type carrying the kind-specific attributes
//! of a node. Most variants are plain data structs; the four commitable
//! kinds (`Requirement`, `Story`, `UseCase`, `Product`) wrap theirs in
//! [`Commitable`], which freezes the scalar data once committed and carries
//! the change-chain references used for traceability.
//!
//! Typed references to other nodes (the change chain, address lines) are
//! stored as [`NodeId`]s and resolved through the graph arena; they are part
//! of the reachable closure and surface through [`Payload::extra_refs`].

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::NodeId;
use crate::kind::NodeKind;

/// Current Unix time in seconds. Timestamp columns store this directly.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Commitable overlay
// ---------------------------------------------------------------------------

/// Wrapper enforcing the commitable discipline on a kind's scalar data.
///
/// Once [`commit`](Commitable::commit) has been called, [`data_mut`]
/// (Commitable::data_mut) fails with [`CoreError::NotChanged`]; the only way
/// to change a committed node is to hang a change child off it. The change
/// chain itself stays mutable after commit; freezing applies to the scalar
/// attributes only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Commitable<T> {
    committed: bool,
    /// Node this one is a change of. `None` on the ultimate parent.
    pub change_parent: Option<NodeId>,
    /// Node that changes this one. `None` when there are no more changes.
    pub change_child: Option<NodeId>,
    data: T,
}

impl<T> Commitable<T> {
    /// Wraps fresh, uncommitted data.
    pub fn new(data: T) -> Self {
        Commitable {
            committed: false,
            change_parent: None,
            change_child: None,
            data,
        }
    }

    /// Rebuilds a wrapper from archived or loaded state.
    pub fn restore(data: T, committed: bool) -> Self {
        Commitable {
            committed,
            change_parent: None,
            change_child: None,
            data,
        }
    }

    /// Read access to the scalar data.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Mutable access to the scalar data; fails once committed.
    pub fn data_mut(&mut self) -> Result<&mut T, CoreError> {
        if self.committed {
            return Err(CoreError::NotChanged);
        }
        Ok(&mut self.data)
    }

    /// Mutable access that bypasses the committed freeze. Loaders use this
    /// to populate fields from rows that may represent committed state.
    pub fn data_raw_mut(&mut self) -> &mut T {
        &mut self.data
    }

    /// Commits the data. One-way: there is no uncommit.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

// ---------------------------------------------------------------------------
// Per-kind data structs
// ---------------------------------------------------------------------------

/// Conventional graph root; its title is what listers display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNodeData {
    pub title: String,
}

/// An organization owns other nodes. Locking prevents scalar changes while
/// still allowing links to be added or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationData {
    locked: bool,
    name: String,
}

impl OrganizationData {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the name; fails while the organization is locked.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), CoreError> {
        if self.locked {
            return Err(CoreError::Locked);
        }
        self.name = name.into();
        Ok(())
    }

    /// Restores the name regardless of the lock. Loader path.
    pub fn set_name_raw(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductData {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectData {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementData {
    pub title: String,
    pub text: String,
    /// Functional vs non-functional requirement.
    pub functional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryData {
    pub title: String,
    pub goal: String,
    pub benefit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UseCaseData {
    pub name: String,
}

/// Free text to annotate any node. Chains through its own down list when one
/// line is not enough.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedData {
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyValueData {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeEstimateData {
    pub text: String,
    /// Estimate, in seconds from whenever the work starts.
    pub estimate: i64,
    pub started: bool,
    /// Start timestamp (Unix seconds), meaningful once `started` is true.
    pub start: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffortData {
    pub text: String,
    /// Effort spent, in seconds.
    pub effort: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleData {
    /// The "As a ..." part: "Administrator", "Customer", etc.
    pub who: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorData {
    pub actor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalData {
    pub action: String,
    pub outcome: String,
    pub context: String,
    /// Target date (Unix seconds).
    pub target_date: i64,
    pub target_date_confidence: String,
    pub alignment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurposeData {
    pub description: String,
    /// Delivery deadline (Unix seconds).
    pub deadline: i64,
    pub deadline_confidence: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonData {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailAddressData {
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhoneNumberData {
    pub country_code: String,
    pub number: String,
    /// Cell, landline, home, office, etc.
    pub phone_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InternationalAddressData {
    /// Ideally an ISO 3166-1 country code.
    pub country_code: String,
    /// Head `Text` node of the address-line chain.
    pub address_lines: Option<NodeId>,
    pub locality: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsAddressData {
    /// Head `Text` node of the address-line chain.
    pub address_lines: Option<NodeId>,
    pub city: String,
    pub state: String,
    pub zipcode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub name: String,
    pub description: String,
}

/// Template for spawning regular todos on a schedule. Exactly one of the
/// three interval flags should be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecurringTodoData {
    pub description: String,
    /// Creation timestamp (Unix seconds).
    pub created: i64,
    pub recurring_interval: i64,
    pub seconds_flag: bool,
    pub day_of_month_flag: bool,
    pub day_of_year_flag: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoData {
    pub description: String,
    /// Creation timestamp (Unix seconds).
    pub created: i64,
    pub due: i64,
    pub completed: bool,
    pub date_completed: i64,
    /// Set when this todo was spawned from a recurring template.
    pub spawned_from: Option<NodeId>,
}

/// Locator record handed out by `GET /graphs`: enough for a client to find
/// and fetch one graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerLocatorData {
    pub graph_uuid: String,
    pub graph_title: String,
    pub graph_address: String,
}

// ---------------------------------------------------------------------------
// The payload sum type
// ---------------------------------------------------------------------------

/// Kind-specific attributes of a node, one variant per [`NodeKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Node,
    GraphNode(GraphNodeData),
    Organization(OrganizationData),
    Product(Commitable<ProductData>),
    Project(ProjectData),
    Requirement(Commitable<RequirementData>),
    Story(Commitable<StoryData>),
    UseCase(Commitable<UseCaseData>),
    Text(TextData),
    Completed(CompletedData),
    KeyValue(KeyValueData),
    TimeEstimate(TimeEstimateData),
    Effort(EffortData),
    Role(RoleData),
    Actor(ActorData),
    Goal(GoalData),
    Purpose(PurposeData),
    Person(PersonData),
    EmailAddress(EmailAddressData),
    PhoneNumber(PhoneNumberData),
    InternationalAddress(InternationalAddressData),
    UsAddress(UsAddressData),
    Event(EventData),
    RecurringTodo(RecurringTodoData),
    Todo(TodoData),
    ServerLocator(ServerLocatorData),
}

impl Payload {
    /// The kind tag for this payload.
    pub fn kind(&self) -> NodeKind {
        match self {
            Payload::Node => NodeKind::Node,
            Payload::GraphNode(_) => NodeKind::GraphNode,
            Payload::Organization(_) => NodeKind::Organization,
            Payload::Product(_) => NodeKind::Product,
            Payload::Project(_) => NodeKind::Project,
            Payload::Requirement(_) => NodeKind::Requirement,
            Payload::Story(_) => NodeKind::Story,
            Payload::UseCase(_) => NodeKind::UseCase,
            Payload::Text(_) => NodeKind::Text,
            Payload::Completed(_) => NodeKind::Completed,
            Payload::KeyValue(_) => NodeKind::KeyValue,
            Payload::TimeEstimate(_) => NodeKind::TimeEstimate,
            Payload::Effort(_) => NodeKind::Effort,
            Payload::Role(_) => NodeKind::Role,
            Payload::Actor(_) => NodeKind::Actor,
            Payload::Goal(_) => NodeKind::Goal,
            Payload::Purpose(_) => NodeKind::Purpose,
            Payload::Person(_) => NodeKind::Person,
            Payload::EmailAddress(_) => NodeKind::EmailAddress,
            Payload::PhoneNumber(_) => NodeKind::PhoneNumber,
            Payload::InternationalAddress(_) => NodeKind::InternationalAddress,
            Payload::UsAddress(_) => NodeKind::UsAddress,
            Payload::Event(_) => NodeKind::Event,
            Payload::RecurringTodo(_) => NodeKind::RecurringTodo,
            Payload::Todo(_) => NodeKind::Todo,
            Payload::ServerLocator(_) => NodeKind::ServerLocatorNode,
        }
    }

    /// A default payload for the given kind. Used by the graph factory when
    /// allocating blank nodes and by the archive for unknown kind names.
    pub fn blank(kind: NodeKind) -> Payload {
        match kind {
            NodeKind::Node => Payload::Node,
            NodeKind::GraphNode => Payload::GraphNode(GraphNodeData::default()),
            NodeKind::Organization => Payload::Organization(OrganizationData::default()),
            NodeKind::Product => Payload::Product(Commitable::default()),
            NodeKind::Project => Payload::Project(ProjectData::default()),
            NodeKind::Requirement => Payload::Requirement(Commitable::default()),
            NodeKind::Story => Payload::Story(Commitable::default()),
            NodeKind::UseCase => Payload::UseCase(Commitable::default()),
            NodeKind::Text => Payload::Text(TextData::default()),
            NodeKind::Completed => Payload::Completed(CompletedData::default()),
            NodeKind::KeyValue => Payload::KeyValue(KeyValueData::default()),
            NodeKind::TimeEstimate => Payload::TimeEstimate(TimeEstimateData::default()),
            NodeKind::Effort => Payload::Effort(EffortData::default()),
            NodeKind::Role => Payload::Role(RoleData::default()),
            NodeKind::Actor => Payload::Actor(ActorData::default()),
            NodeKind::Goal => Payload::Goal(GoalData::default()),
            NodeKind::Purpose => Payload::Purpose(PurposeData::default()),
            NodeKind::Person => Payload::Person(PersonData::default()),
            NodeKind::EmailAddress => Payload::EmailAddress(EmailAddressData::default()),
            NodeKind::PhoneNumber => Payload::PhoneNumber(PhoneNumberData::default()),
            NodeKind::InternationalAddress => {
                Payload::InternationalAddress(InternationalAddressData::default())
            }
            NodeKind::UsAddress => Payload::UsAddress(UsAddressData::default()),
            NodeKind::Event => Payload::Event(EventData::default()),
            NodeKind::RecurringTodo => Payload::RecurringTodo(RecurringTodoData::default()),
            NodeKind::Todo => Payload::Todo(TodoData::default()),
            NodeKind::ServerLocatorNode => Payload::ServerLocator(ServerLocatorData::default()),
        }
    }

    /// Committed flag for commitable kinds, `None` otherwise.
    pub fn is_committed(&self) -> Option<bool> {
        match self {
            Payload::Product(c) => Some(c.is_committed()),
            Payload::Requirement(c) => Some(c.is_committed()),
            Payload::Story(c) => Some(c.is_committed()),
            Payload::UseCase(c) => Some(c.is_committed()),
            _ => None,
        }
    }

    /// Commits a commitable node; fails for every other kind.
    pub fn commit(&mut self) -> Result<(), CoreError> {
        match self {
            Payload::Product(c) => c.commit(),
            Payload::Requirement(c) => c.commit(),
            Payload::Story(c) => c.commit(),
            Payload::UseCase(c) => c.commit(),
            other => {
                return Err(CoreError::NotCommitable { kind: other.kind() });
            }
        }
        Ok(())
    }

    pub fn change_parent(&self) -> Option<NodeId> {
        match self {
            Payload::Product(c) => c.change_parent,
            Payload::Requirement(c) => c.change_parent,
            Payload::Story(c) => c.change_parent,
            Payload::UseCase(c) => c.change_parent,
            _ => None,
        }
    }

    pub fn change_child(&self) -> Option<NodeId> {
        match self {
            Payload::Product(c) => c.change_child,
            Payload::Requirement(c) => c.change_child,
            Payload::Story(c) => c.change_child,
            Payload::UseCase(c) => c.change_child,
            _ => None,
        }
    }

    /// Sets the change parent. The change chain stays writable after commit.
    pub fn set_change_parent(&mut self, parent: Option<NodeId>) -> Result<(), CoreError> {
        match self {
            Payload::Product(c) => c.change_parent = parent,
            Payload::Requirement(c) => c.change_parent = parent,
            Payload::Story(c) => c.change_parent = parent,
            Payload::UseCase(c) => c.change_parent = parent,
            other => {
                return Err(CoreError::NotCommitable { kind: other.kind() });
            }
        }
        Ok(())
    }

    /// Sets the change child. The change chain stays writable after commit.
    pub fn set_change_child(&mut self, child: Option<NodeId>) -> Result<(), CoreError> {
        match self {
            Payload::Product(c) => c.change_child = child,
            Payload::Requirement(c) => c.change_child = child,
            Payload::Story(c) => c.change_child = child,
            Payload::UseCase(c) => c.change_child = child,
            other => {
                return Err(CoreError::NotCommitable { kind: other.kind() });
            }
        }
        Ok(())
    }

    /// The head of the address-line chain for address kinds.
    pub fn address_lines(&self) -> Option<NodeId> {
        match self {
            Payload::InternationalAddress(d) => d.address_lines,
            Payload::UsAddress(d) => d.address_lines,
            _ => None,
        }
    }

    /// Kind-specific typed references beyond the generic up/down lists:
    /// the commitable change chain and the address-line head. Traversal
    /// follows these in order after the down list.
    pub fn extra_refs(&self) -> Vec<NodeId> {
        let mut refs = Vec::new();
        if let Some(parent) = self.change_parent() {
            refs.push(parent);
        }
        if let Some(child) = self.change_child() {
            refs.push(child);
        }
        if let Some(lines) = self.address_lines() {
            refs.push(lines);
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitable_freezes_scalar_data() {
        let mut c = Commitable::new(RequirementData::default());
        c.data_mut().unwrap().title = "t".into();
        c.commit();
        assert!(c.is_committed());
        assert!(matches!(c.data_mut(), Err(CoreError::NotChanged)));
        assert_eq!(c.data().title, "t");
    }

    #[test]
    fn change_chain_stays_writable_after_commit() {
        let mut payload = Payload::Requirement(Commitable::new(RequirementData::default()));
        payload.commit().unwrap();
        let child = NodeId::generate();
        payload.set_change_child(Some(child)).unwrap();
        assert_eq!(payload.change_child(), Some(child));
    }

    #[test]
    fn commit_rejects_non_commitable_kinds() {
        let mut payload = Payload::Text(TextData::default());
        assert!(matches!(
            payload.commit(),
            Err(CoreError::NotCommitable { .. })
        ));
    }

    #[test]
    fn organization_lock_blocks_set_name() {
        let mut org = OrganizationData::default();
        org.set_name("GCSE,Inc").unwrap();
        org.lock();
        assert!(matches!(org.set_name("Other"), Err(CoreError::Locked)));
        assert_eq!(org.name(), "GCSE,Inc");
        org.unlock();
        org.set_name("Other").unwrap();
        assert_eq!(org.name(), "Other");
    }

    #[test]
    fn blank_matches_kind() {
        for kind in crate::kind::ALL_KINDS {
            assert_eq!(Payload::blank(kind).kind(), kind);
        }
    }

    #[test]
    fn extra_refs_cover_overlay_references() {
        let parent = NodeId::generate();
        let child = NodeId::generate();
        let mut payload = Payload::Story(Commitable::new(StoryData::default()));
        payload.set_change_parent(Some(parent)).unwrap();
        payload.set_change_child(Some(child)).unwrap();
        assert_eq!(payload.extra_refs(), vec![parent, child]);

        let lines = NodeId::generate();
        let address = Payload::UsAddress(UsAddressData {
            address_lines: Some(lines),
            ..UsAddressData::default()
        });
        assert_eq!(address.extra_refs(), vec![lines]);
        assert!(Payload::Node.extra_refs().is_empty());
    }
}
