//! Synchronous side of lifecycle tracking.
//!
//! Turns the raw hook calls of the interception layer into ledger
//! notifications. Handlers run while the mutation is on the stack and may
//! mutate the tree again, so every decision is re-derived per node at the
//! moment its notification is about to fire.

use std::rc::Rc;

use crate::binder::BinderTable;
use crate::dom::Node;
use crate::intercept::MutationHooks;
use crate::projected_tree::ProjectedTreeState;

pub struct SyncMutationWatcher {
    binders: Rc<BinderTable>,
    projected: ProjectedTreeState,
}

impl SyncMutationWatcher {
    pub(crate) fn new(binders: Rc<BinderTable>) -> Self {
        Self {
            binders,
            projected: ProjectedTreeState::new(),
        }
    }

    pub fn projected(&self) -> &ProjectedTreeState {
        &self.projected
    }

    /// True when `node` is connected or will be once the operation in flight
    /// completes.
    pub fn is_inserted(&self, node: &Node) -> bool {
        self.projected.is_inserted(node)
    }

    // A node parked under a parent that is itself about to be inserted
    // keeps its speculative mark.
    fn unmark_if_detached(&self, node: &Node) {
        let parked = node
            .parent()
            .is_some_and(|parent| self.projected.is_inserted(&parent));
        if !node.is_connected() && !parked {
            self.projected.mark_node_removed(node);
        }
    }
}

impl MutationHooks for SyncMutationWatcher {
    fn before_insert(&self, node: &Node, parent: &Node) {
        if !self.projected.is_inserted(parent) {
            return;
        }
        let _operation = self.projected.begin_insert_operation(node);
        for (target, binder) in self.binders.collect_subtree(node) {
            // Earlier handlers may have moved this node out already.
            if self.projected.is_inserted(&target) {
                binder.notify_before_inserted();
            }
        }
    }

    fn after_change(&self, node: &Node) {
        self.unmark_if_detached(node);
        for (target, binder) in self.binders.collect_subtree(node) {
            if target.is_connected() {
                binder.notify_after_inserted();
            } else if self.projected.is_inserted(&target) {
                // Finished by the after hook of an ancestor.
                continue;
            } else {
                binder.notify_after_removed();
            }
        }
    }

    /// Rolls back ledgers that the before phase moved to attached.
    fn insert_failed(&self, node: &Node) {
        self.unmark_if_detached(node);
        for (target, binder) in self.binders.collect_subtree(node) {
            if !self.projected.is_inserted(&target) {
                binder.notify_after_removed();
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/sync_watcher_tests.rs"]
mod tests;
