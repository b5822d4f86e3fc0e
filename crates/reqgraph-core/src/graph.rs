//! The node arena.
//!
//! [`NodeGraph`] owns every node of one reachable graph, keyed by
//! identifier. Links are stored as [`NodeId`]s and resolved through the
//! arena, so shared ownership and cycles are legal without leaking at the
//! ownership layer. Each node sits behind its own `RwLock` (the
//! [`NodeHandle`]); the graph factory hands these handles to loader tasks so
//! sibling workers can populate payloads while edges are still being wired.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::NodeRecord;
use crate::payload::Payload;

/// Shared handle to one node.
pub type NodeHandle = Arc<RwLock<NodeRecord>>;

/// Read-locks a node handle, recovering from poisoning.
pub fn read_node(handle: &NodeHandle) -> RwLockReadGuard<'_, NodeRecord> {
    handle.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-locks a node handle, recovering from poisoning.
pub fn write_node(handle: &NodeHandle) -> RwLockWriteGuard<'_, NodeRecord> {
    handle.write().unwrap_or_else(PoisonError::into_inner)
}

/// An arena of nodes keyed by identifier.
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: HashMap<NodeId, NodeHandle>,
}

impl NodeGraph {
    pub fn new() -> Self {
        NodeGraph::default()
    }

    /// Adds a record to the arena, initializing it first if it has no
    /// identifier yet. Returns the node's id.
    pub fn add(&mut self, mut record: NodeRecord) -> NodeId {
        if !record.is_initialized() {
            record.init();
        }
        let id = record.id();
        self.nodes.insert(id, Arc::new(RwLock::new(record)));
        id
    }

    /// Looks a node handle up by id.
    pub fn node(&self, id: NodeId) -> Option<NodeHandle> {
        self.nodes.get(&id).cloned()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All identifiers currently in the arena, in no particular order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Removes a node from the arena. Links pointing at it are left in
    /// place; traversal skips identifiers with no backing record.
    pub fn remove(&mut self, id: NodeId) -> Option<NodeHandle> {
        self.nodes.remove(&id)
    }

    /// Establishes both sides of a parent/child link: the child goes into
    /// the parent's down list and the parent into the child's up list. This
    /// is the canonical way to link two nodes.
    pub fn connect(&self, parent: NodeId, child: NodeId) -> Result<(), CoreError> {
        let parent_handle = self
            .node(parent)
            .ok_or(CoreError::MissingNode { id: parent })?;
        let child_handle = self.node(child).ok_or(CoreError::MissingNode { id: child })?;
        write_node(&parent_handle).add_down(child);
        write_node(&child_handle).add_up(parent);
        Ok(())
    }

    // -- traversal ---------------------------------------------------------

    /// Visits every node reachable from `root` exactly once, cycle-safe.
    ///
    /// Order per node: the node itself, then each up neighbor, then each
    /// down neighbor, then the kind-specific extra references (change
    /// chain, address lines). Identifiers with no record in the arena are
    /// skipped.
    pub fn traverse(&self, root: NodeId, visit: &mut dyn FnMut(&NodeRecord)) {
        let mut visited = HashSet::new();
        self.traverse_with(root, &mut visited, visit);
    }

    /// Traversal with a caller-supplied visited set, so several roots can
    /// share one pass.
    pub fn traverse_with(
        &self,
        root: NodeId,
        visited: &mut HashSet<NodeId>,
        visit: &mut dyn FnMut(&NodeRecord),
    ) {
        if !visited.insert(root) {
            return;
        }
        let Some(handle) = self.node(root) else {
            return;
        };
        let (ups, downs, extras) = {
            let record = read_node(&handle);
            visit(&record);
            (
                record.up.clone(),
                record.down.clone(),
                record.payload().extra_refs(),
            )
        };
        for id in ups.into_iter().chain(downs).chain(extras) {
            self.traverse_with(id, visited, visit);
        }
    }

    /// Identifiers of the reachable closure from `root`, in visit order.
    pub fn reachable(&self, root: NodeId) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.traverse(root, &mut |record| ids.push(record.id()));
        ids
    }

    // -- commitable change chain -------------------------------------------

    /// Returns the change child of a commitable node, creating a fresh
    /// uncommitted node of the same kind if there is none yet.
    pub fn change_node(&mut self, id: NodeId) -> Result<NodeId, CoreError> {
        let handle = self.node(id).ok_or(CoreError::MissingNode { id })?;
        let kind = {
            let record = read_node(&handle);
            if let Some(child) = record.payload().change_child() {
                return Ok(child);
            }
            record.kind()
        };
        if !kind.is_commitable() {
            return Err(CoreError::NotCommitable { kind });
        }
        let mut child = NodeRecord::new(Payload::blank(kind));
        child.init();
        child.payload_mut().set_change_parent(Some(id))?;
        let child_id = self.add(child);
        write_node(&handle)
            .payload_mut()
            .set_change_child(Some(child_id))?;
        Ok(child_id)
    }

    /// Discards an uncommitted change child. Fails with `NotDiscarded` when
    /// the immediate child is committed; does nothing when there is none.
    pub fn discard_change(&mut self, id: NodeId) -> Result<(), CoreError> {
        let handle = self.node(id).ok_or(CoreError::MissingNode { id })?;
        let child = read_node(&handle).payload().change_child();
        let Some(child_id) = child else {
            return Ok(());
        };
        let child_committed = self
            .node(child_id)
            .map(|h| read_node(&h).payload().is_committed().unwrap_or(false))
            .unwrap_or(false);
        if child_committed {
            return Err(CoreError::NotDiscarded);
        }
        write_node(&handle).payload_mut().set_change_child(None)?;
        self.remove(child_id);
        Ok(())
    }

    // -- todos -------------------------------------------------------------

    /// Spawns a [`Todo`](crate::kind::NodeKind::Todo) from a recurring
    /// template: same description, `spawned_from` pointing back at the
    /// template, recursing into recurring children so task templates spawn
    /// whole task trees.
    pub fn todo_from_recurring(&mut self, id: NodeId) -> Result<NodeId, CoreError> {
        let handle = self.node(id).ok_or(CoreError::MissingNode { id })?;
        let (description, children) = {
            let record = read_node(&handle);
            let Payload::RecurringTodo(data) = record.payload() else {
                return Err(CoreError::KindMismatch {
                    expected: "RecurringTodo",
                    found: record.kind_name(),
                });
            };
            (data.description.clone(), record.down.clone())
        };

        let mut todo = NodeRecord::todo(description);
        if let Payload::Todo(data) = todo.payload_mut() {
            data.spawned_from = Some(id);
        }
        let todo_id = self.add(todo);

        for child in children {
            let is_recurring = self
                .node(child)
                .map(|h| matches!(read_node(&h).payload(), Payload::RecurringTodo(_)))
                .unwrap_or(false);
            if is_recurring {
                let spawned = self.todo_from_recurring(child)?;
                if let Some(todo_handle) = self.node(todo_id) {
                    write_node(&todo_handle).add_down(spawned);
                }
            }
        }
        Ok(todo_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_initializes_uninitialized_records() {
        let mut graph = NodeGraph::new();
        let id = graph.add(NodeRecord::plain());
        assert!(!id.is_nil());
        assert!(graph.contains(id));
    }

    #[test]
    fn connect_sets_both_sides() {
        let mut graph = NodeGraph::new();
        let parent = graph.add(NodeRecord::organization("org"));
        let child = graph.add(NodeRecord::project("proj", ""));
        graph.connect(parent, child).unwrap();

        let parent_handle = graph.node(parent).unwrap();
        let child_handle = graph.node(child).unwrap();
        assert_eq!(read_node(&parent_handle).find_down(child), Some(child));
        assert_eq!(read_node(&child_handle).find_up(parent), Some(parent));
    }

    #[test]
    fn connect_missing_node_fails() {
        let mut graph = NodeGraph::new();
        let parent = graph.add(NodeRecord::plain());
        let err = graph.connect(parent, NodeId::generate()).unwrap_err();
        assert!(matches!(err, CoreError::MissingNode { .. }));
    }

    #[test]
    fn traversal_visits_cycles_exactly_once() {
        let mut graph = NodeGraph::new();
        let a = graph.add(NodeRecord::plain());
        let b = graph.add(NodeRecord::plain());
        let c = graph.add(NodeRecord::plain());
        graph.connect(a, b).unwrap();
        graph.connect(b, c).unwrap();
        // Close the cycle: c owns a.
        graph.connect(c, a).unwrap();

        let mut seen = Vec::new();
        graph.traverse(a, &mut |record| seen.push(record.id()));
        assert_eq!(seen.len(), 3);
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn traversal_order_is_node_up_down() {
        let mut graph = NodeGraph::new();
        let mid = graph.add(NodeRecord::plain());
        let up = graph.add(NodeRecord::plain());
        let down = graph.add(NodeRecord::plain());
        graph.connect(up, mid).unwrap();
        graph.connect(mid, down).unwrap();

        let mut seen = Vec::new();
        graph.traverse(mid, &mut |record| seen.push(record.id()));
        assert_eq!(seen, vec![mid, up, down]);
    }

    #[test]
    fn traversal_follows_change_chain() {
        let mut graph = NodeGraph::new();
        let req = graph.add(NodeRecord::requirement("t", "x"));
        let change = graph.change_node(req).unwrap();

        let mut seen = Vec::new();
        graph.traverse(req, &mut |record| seen.push(record.id()));
        assert!(seen.contains(&change));
        // And from the child back up through the parent reference.
        let mut seen = Vec::new();
        graph.traverse(change, &mut |record| seen.push(record.id()));
        assert!(seen.contains(&req));
    }

    #[test]
    fn change_node_creates_then_reuses() {
        let mut graph = NodeGraph::new();
        let req = graph.add(NodeRecord::requirement("t", "x"));
        let first = graph.change_node(req).unwrap();
        let second = graph.change_node(req).unwrap();
        assert_eq!(first, second);

        let child = graph.node(first).unwrap();
        let record = read_node(&child);
        assert_eq!(record.kind(), crate::kind::NodeKind::Requirement);
        assert_eq!(record.payload().change_parent(), Some(req));
    }

    #[test]
    fn change_node_rejects_non_commitable() {
        let mut graph = NodeGraph::new();
        let org = graph.add(NodeRecord::organization("o"));
        assert!(matches!(
            graph.change_node(org),
            Err(CoreError::NotCommitable { .. })
        ));
    }

    #[test]
    fn commitable_change_flow() {
        let mut graph = NodeGraph::new();
        let req = graph.add(NodeRecord::requirement("t", "x"));
        let handle = graph.node(req).unwrap();

        // Committing freezes the scalar data.
        write_node(&handle).payload_mut().commit().unwrap();
        {
            let mut record = write_node(&handle);
            let Payload::Requirement(c) = record.payload_mut() else {
                unreachable!();
            };
            assert!(matches!(c.data_mut(), Err(CoreError::NotChanged)));
        }

        // A change node is available and discardable while uncommitted.
        let first_change = graph.change_node(req).unwrap();
        assert!(graph.contains(first_change));
        graph.discard_change(req).unwrap();

        // A fresh change node, once committed, can no longer be discarded.
        let second_change = graph.change_node(req).unwrap();
        assert_ne!(first_change, second_change);
        let child_handle = graph.node(second_change).unwrap();
        write_node(&child_handle).payload_mut().commit().unwrap();
        assert!(matches!(
            graph.discard_change(req),
            Err(CoreError::NotDiscarded)
        ));
    }

    #[test]
    fn discard_change_clears_uncommitted_child() {
        let mut graph = NodeGraph::new();
        let req = graph.add(NodeRecord::requirement("t", "x"));
        let child = graph.change_node(req).unwrap();
        graph.discard_change(req).unwrap();

        let handle = graph.node(req).unwrap();
        assert_eq!(read_node(&handle).payload().change_child(), None);
        assert!(!graph.contains(child));
    }

    #[test]
    fn discard_change_rejects_committed_child() {
        let mut graph = NodeGraph::new();
        let req = graph.add(NodeRecord::requirement("t", "x"));
        let child = graph.change_node(req).unwrap();
        let child_handle = graph.node(child).unwrap();
        write_node(&child_handle).payload_mut().commit().unwrap();

        assert!(matches!(
            graph.discard_change(req),
            Err(CoreError::NotDiscarded)
        ));
    }

    #[test]
    fn todo_from_recurring_spawns_tree() {
        let mut graph = NodeGraph::new();
        let template = graph.add(NodeRecord::recurring_todo("Test description"));
        let child_template = graph.add(NodeRecord::recurring_todo("child"));
        graph.connect(template, child_template).unwrap();

        let todo = graph.todo_from_recurring(template).unwrap();
        let handle = graph.node(todo).unwrap();
        let record = read_node(&handle);
        let Payload::Todo(data) = record.payload() else {
            unreachable!();
        };
        assert_eq!(data.description, "Test description");
        assert_eq!(data.spawned_from, Some(template));
        assert!(!data.completed);
        assert_eq!(record.down.len(), 1);

        let spawned_child = graph.node(record.down[0]).unwrap();
        let child_record = read_node(&spawned_child);
        let Payload::Todo(child_data) = child_record.payload() else {
            unreachable!();
        };
        assert_eq!(child_data.description, "child");
        assert_eq!(child_data.spawned_from, Some(child_template));
    }

    #[test]
    fn todo_from_recurring_rejects_other_kinds() {
        let mut graph = NodeGraph::new();
        let text = graph.add(NodeRecord::text("t"));
        assert!(matches!(
            graph.todo_from_recurring(text),
            Err(CoreError::KindMismatch { .. })
        ));
    }
}
