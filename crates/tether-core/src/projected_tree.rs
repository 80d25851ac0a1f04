//! Speculative tree membership for multi-step mutations.
//!
//! A logical move can reach the interception layer as several primitive
//! calls. While at least one insert operation is open, nodes marked here are
//! treated as inserted even if the real tree has not caught up yet.

use std::cell::{Cell, RefCell};

use crate::collections::map::HashSet;
use crate::dom::{Node, NodeId};

#[derive(Default)]
pub struct ProjectedTreeState {
    nodes: RefCell<HashSet<NodeId>>,
    open_operations: Cell<usize>,
}

impl ProjectedTreeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an operation and marks `node` with its whole subtree. Marks are
    /// always rewritten: an earlier step may have cleared part of the subtree.
    pub fn start_insert_operation(&self, node: &Node) {
        self.open_operations.set(self.open_operations.get() + 1);
        let mut nodes = self.nodes.borrow_mut();
        for descendant in node.subtree() {
            nodes.insert(descendant.id());
        }
    }

    pub fn end_insert_operation(&self) {
        let open = self.open_operations.get().saturating_sub(1);
        self.open_operations.set(open);
        if open == 0 {
            self.nodes.borrow_mut().clear();
        }
    }

    /// Scoped form of [`start_insert_operation`](Self::start_insert_operation);
    /// the operation closes when the guard drops, unwinding included.
    pub fn begin_insert_operation(&self, node: &Node) -> InsertOperation<'_> {
        self.start_insert_operation(node);
        InsertOperation { state: self }
    }

    pub fn mark_node_removed(&self, node: &Node) {
        let mut nodes = self.nodes.borrow_mut();
        if nodes.is_empty() {
            return;
        }
        for descendant in node.subtree() {
            nodes.remove(&descendant.id());
        }
    }

    pub fn is_inserted(&self, node: &Node) -> bool {
        node.is_connected() || self.nodes.borrow().contains(&node.id())
    }

    pub fn open_operations(&self) -> usize {
        self.open_operations.get()
    }
}

#[must_use = "the insert operation closes when this guard is dropped"]
pub struct InsertOperation<'a> {
    state: &'a ProjectedTreeState,
}

impl Drop for InsertOperation<'_> {
    fn drop(&mut self) {
        self.state.end_insert_operation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn marks_whole_subtree_until_outermost_operation_ends() {
        let document = Document::new();
        let outer = document.create_element("outer");
        let inner = document.create_element("inner");
        outer.append_child(&inner).unwrap();
        let state = ProjectedTreeState::new();

        state.start_insert_operation(&outer);
        state.start_insert_operation(&inner);
        assert!(state.is_inserted(&inner));
        state.end_insert_operation();
        assert!(state.is_inserted(&inner));
        state.end_insert_operation();
        assert!(!state.is_inserted(&inner));
        assert_eq!(state.open_operations(), 0);
    }

    #[test]
    fn remarking_restores_nodes_cleared_by_an_earlier_step() {
        let document = Document::new();
        let outer = document.create_element("outer");
        let inner = document.create_element("inner");
        outer.append_child(&inner).unwrap();
        let state = ProjectedTreeState::new();

        let _outer_op = state.begin_insert_operation(&outer);
        state.mark_node_removed(&inner);
        assert!(!state.is_inserted(&inner));
        let _again = state.begin_insert_operation(&outer);
        assert!(state.is_inserted(&inner));
    }

    #[test]
    fn real_connection_counts_without_open_operation() {
        let document = Document::new();
        let node = document.create_element("div");
        let state = ProjectedTreeState::new();
        assert!(!state.is_inserted(&node));
        document.body().append_child(&node).unwrap();
        assert!(state.is_inserted(&node));
    }

    #[test]
    fn guard_closes_operation_on_unwind() {
        let document = Document::new();
        let node = document.create_element("div");
        let state = ProjectedTreeState::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _op = state.begin_insert_operation(&node);
            panic!("handler failed");
        }));
        assert!(result.is_err());
        assert_eq!(state.open_operations(), 0);
        assert!(!state.is_inserted(&node));
    }
}
