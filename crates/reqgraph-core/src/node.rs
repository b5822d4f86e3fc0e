//! The node record.
//!
//! [`NodeRecord`] is the unit of data: an identifier, the ordered up/down
//! link lists, a dirty flag, and the kind-specific [`Payload`]. Creation
//! allocates memory only; identity is conferred by an explicit
//! [`init`](NodeRecord::init). A record whose identifier was set from an
//! external source (database row, archive document) counts as already
//! initialized and is never re-initialized by traversal.

use crate::error::CoreError;
use crate::id::NodeId;
use crate::kind::NodeKind;
use crate::payload::{
    unix_now, Commitable, GraphNodeData, OrganizationData, Payload, ProductData, ProjectData,
    RecurringTodoData, RequirementData, ServerLocatorData, StoryData, TextData, TodoData,
    UseCaseData,
};

/// A node in a requirements graph.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    id: NodeId,
    initialized: bool,
    changed: bool,
    /// Parent-like links: owners, parents, required-by.
    pub up: Vec<NodeId>,
    /// Child-like links: children, contents, requires.
    pub down: Vec<NodeId>,
    payload: Payload,
}

impl NodeRecord {
    /// Creates an uninitialized record around the given payload.
    pub fn new(payload: Payload) -> Self {
        NodeRecord {
            id: NodeId::nil(),
            initialized: false,
            changed: false,
            up: Vec::new(),
            down: Vec::new(),
            payload,
        }
    }

    // -- convenience constructors ------------------------------------------

    pub fn plain() -> Self {
        NodeRecord::new(Payload::Node)
    }

    pub fn graph_node(title: impl Into<String>) -> Self {
        NodeRecord::new(Payload::GraphNode(GraphNodeData {
            title: title.into(),
        }))
    }

    pub fn organization(name: impl Into<String>) -> Self {
        let mut data = OrganizationData::default();
        data.set_name_raw(name);
        NodeRecord::new(Payload::Organization(data))
    }

    pub fn project(name: impl Into<String>, description: impl Into<String>) -> Self {
        NodeRecord::new(Payload::Project(ProjectData {
            name: name.into(),
            description: description.into(),
        }))
    }

    pub fn product(title: impl Into<String>, description: impl Into<String>) -> Self {
        NodeRecord::new(Payload::Product(Commitable::new(ProductData {
            title: title.into(),
            description: description.into(),
        })))
    }

    pub fn requirement(title: impl Into<String>, text: impl Into<String>) -> Self {
        NodeRecord::new(Payload::Requirement(Commitable::new(RequirementData {
            title: title.into(),
            text: text.into(),
            functional: false,
        })))
    }

    pub fn story(
        title: impl Into<String>,
        goal: impl Into<String>,
        benefit: impl Into<String>,
    ) -> Self {
        NodeRecord::new(Payload::Story(Commitable::new(StoryData {
            title: title.into(),
            goal: goal.into(),
            benefit: benefit.into(),
        })))
    }

    pub fn use_case(name: impl Into<String>) -> Self {
        NodeRecord::new(Payload::UseCase(Commitable::new(UseCaseData {
            name: name.into(),
        })))
    }

    pub fn text(text: impl Into<String>) -> Self {
        NodeRecord::new(Payload::Text(TextData { text: text.into() }))
    }

    pub fn todo(description: impl Into<String>) -> Self {
        NodeRecord::new(Payload::Todo(TodoData {
            description: description.into(),
            created: unix_now(),
            ..TodoData::default()
        }))
    }

    pub fn recurring_todo(description: impl Into<String>) -> Self {
        NodeRecord::new(Payload::RecurringTodo(RecurringTodoData {
            description: description.into(),
            created: unix_now(),
            ..RecurringTodoData::default()
        }))
    }

    pub fn server_locator(
        graph_uuid: impl Into<String>,
        graph_title: impl Into<String>,
        graph_address: impl Into<String>,
    ) -> Self {
        NodeRecord::new(Payload::ServerLocator(ServerLocatorData {
            graph_uuid: graph_uuid.into(),
            graph_title: graph_title.into(),
            graph_address: graph_address.into(),
        }))
    }

    // -- identity ----------------------------------------------------------

    /// Assigns a fresh identifier. Re-running replaces the identifier, so
    /// callers who copied a record and want a distinct entity call this on
    /// the copy.
    pub fn init(&mut self) {
        self.id = NodeId::generate();
        self.initialized = true;
        self.changed = true;
    }

    /// Sets the identifier from an external string form. The record counts
    /// as initialized afterwards so traversal will not re-assign.
    pub fn set_identifier(&mut self, s: &str) -> Result<(), CoreError> {
        self.id = NodeId::parse(s)?;
        self.initialized = true;
        self.changed = true;
        Ok(())
    }

    /// Sets the identifier from an already-parsed id. Same initialization
    /// semantics as [`set_identifier`](NodeRecord::set_identifier).
    pub fn set_id(&mut self, id: NodeId) {
        self.id = id;
        self.initialized = true;
        self.changed = true;
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The canonical string form of the identifier.
    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    pub fn kind_name(&self) -> &'static str {
        self.payload.kind().name()
    }

    // -- dirty flag --------------------------------------------------------

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Clears the dirty flag. The persister calls this just before the
    /// kind-specific write so the stored row captures the post-save state.
    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    // -- payload access ----------------------------------------------------

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Mutable payload access; flips the dirty flag.
    pub fn payload_mut(&mut self) -> &mut Payload {
        self.changed = true;
        &mut self.payload
    }

    /// Mutable payload access that leaves the dirty flag alone. Loaders use
    /// this so that a freshly loaded record mirrors the store.
    pub fn payload_raw_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    // -- links -------------------------------------------------------------

    /// Appends to the up list unless an entry with the same identifier is
    /// already present. Returns the id for chaining.
    pub fn add_up(&mut self, id: NodeId) -> NodeId {
        if !self.up.contains(&id) {
            self.up.push(id);
        }
        id
    }

    /// Appends to the down list unless an entry with the same identifier is
    /// already present. Returns the id for chaining.
    pub fn add_down(&mut self, id: NodeId) -> NodeId {
        if !self.down.contains(&id) {
            self.down.push(id);
        }
        id
    }

    /// Sets the head of the address-line chain on an address node. The
    /// text node is also appended to the down list so the stored scalar
    /// column and the edge table stay consistent.
    pub fn set_address_lines(&mut self, lines: NodeId) -> Result<(), CoreError> {
        match self.payload_mut() {
            Payload::InternationalAddress(d) => d.address_lines = Some(lines),
            Payload::UsAddress(d) => d.address_lines = Some(lines),
            other => {
                return Err(CoreError::KindMismatch {
                    expected: "address",
                    found: other.kind().name(),
                });
            }
        }
        self.add_down(lines);
        Ok(())
    }

    /// Finds an id in the up list.
    pub fn find_up(&self, id: NodeId) -> Option<NodeId> {
        self.up.iter().copied().find(|n| *n == id)
    }

    /// Finds an id in the down list.
    pub fn find_down(&self, id: NodeId) -> Option<NodeId> {
        self.down.iter().copied().find(|n| *n == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_assigns_v7_identifier() {
        let mut node = NodeRecord::plain();
        assert!(node.id().is_nil());
        assert!(!node.is_initialized());
        node.init();
        assert!(node.is_initialized());
        assert!(node.is_changed());
        assert_eq!(node.id().0.get_version_num(), 7);
        assert!(!node.id_string().is_empty());
    }

    #[test]
    fn reinit_replaces_identifier() {
        let mut node = NodeRecord::plain();
        node.init();
        let first = node.id();
        node.init();
        assert_ne!(node.id(), first);
    }

    #[test]
    fn set_identifier_marks_initialized() {
        let external = NodeId::generate();
        let mut node = NodeRecord::plain();
        node.set_identifier(&external.to_string()).unwrap();
        assert!(node.is_initialized());
        assert_eq!(node.id(), external);
    }

    #[test]
    fn add_up_and_add_down_are_idempotent() {
        let mut node = NodeRecord::plain();
        node.init();
        let other = NodeId::generate();
        node.add_up(other);
        node.add_up(other);
        node.add_down(other);
        node.add_down(other);
        assert_eq!(node.up.len(), 1);
        assert_eq!(node.down.len(), 1);
        assert_eq!(node.find_up(other), Some(other));
        assert_eq!(node.find_down(other), Some(other));
        assert_eq!(node.find_up(NodeId::generate()), None);
    }

    #[test]
    fn payload_mut_flips_the_dirty_flag() {
        let mut node = NodeRecord::text("hello");
        node.init();
        node.clear_changed();
        if let Payload::Text(d) = node.payload_mut() {
            d.text = "edited".into();
        }
        assert!(node.is_changed());
    }

    #[test]
    fn payload_raw_mut_leaves_the_dirty_flag() {
        let mut node = NodeRecord::text("hello");
        node.init();
        node.clear_changed();
        if let Payload::Text(d) = node.payload_raw_mut() {
            d.text = "loaded".into();
        }
        assert!(!node.is_changed());
    }

    #[test]
    fn constructors_set_the_kind() {
        assert_eq!(NodeRecord::organization("o").kind(), NodeKind::Organization);
        assert_eq!(NodeRecord::graph_node("g").kind(), NodeKind::GraphNode);
        assert_eq!(NodeRecord::requirement("t", "x").kind(), NodeKind::Requirement);
        assert_eq!(NodeRecord::todo("d").kind(), NodeKind::Todo);
    }

    #[test]
    fn set_address_lines_links_the_text_node() {
        let mut address = NodeRecord::new(Payload::blank(NodeKind::InternationalAddress));
        address.init();
        let lines = NodeId::generate();
        address.set_address_lines(lines).unwrap();
        assert_eq!(address.payload().address_lines(), Some(lines));
        assert_eq!(address.find_down(lines), Some(lines));

        let mut text = NodeRecord::text("not an address");
        text.init();
        assert!(matches!(
            text.set_address_lines(lines),
            Err(CoreError::KindMismatch { .. })
        ));
    }

    #[test]
    fn todo_constructor_stamps_created() {
        let node = NodeRecord::todo("d");
        match node.payload() {
            Payload::Todo(d) => assert!(d.created > 0),
            _ => unreachable!(),
        }
    }
}
