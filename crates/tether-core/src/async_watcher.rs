//! Batched cross-check of the synchronous path.
//!
//! Subscribes to the document's change records. Every tracked node named in
//! a batch (directly or as a descendant) has its ledger compared against the
//! real tree; a disagreement means some mutation bypassed interception. It is
//! logged, counted and corrected on the spot.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::binder::BinderTable;
use crate::dom::{ChangeRecord, Document, Node, NodeId, ObserverHandle};

pub struct ConsistencyWatchdog {
    binders: Rc<BinderTable>,
    mismatches: Cell<usize>,
    observer: RefCell<Option<ObserverHandle>>,
}

impl ConsistencyWatchdog {
    pub(crate) fn new(binders: Rc<BinderTable>) -> Self {
        Self {
            binders,
            mismatches: Cell::new(0),
            observer: RefCell::new(None),
        }
    }

    /// Starts observing `document`. A running watchdog is left as is.
    pub(crate) fn start(self: &Rc<Self>, document: &Document) {
        if self.observer.borrow().is_some() {
            return;
        }
        let this: Weak<Self> = Rc::downgrade(self);
        let handle = document.observe_changes(move |records| {
            if let Some(watchdog) = this.upgrade() {
                watchdog.check(records);
            }
        });
        *self.observer.borrow_mut() = Some(handle);
    }

    pub fn shutdown(&self) {
        if let Some(handle) = self.observer.borrow_mut().take() {
            handle.disconnect();
        }
    }

    pub fn is_active(&self) -> bool {
        self.observer.borrow().is_some()
    }

    pub fn mismatch_count(&self) -> usize {
        self.mismatches.get()
    }

    fn collect_eligible(&self, roots: impl Iterator<Item = Node>) -> IndexMap<NodeId, Node> {
        let mut eligible = IndexMap::new();
        for root in roots {
            for node in root.subtree() {
                if self.binders.contains(&node) {
                    eligible.insert(node.id(), node);
                }
            }
        }
        eligible
    }

    fn check(&self, records: Vec<ChangeRecord>) {
        let added = self.collect_eligible(records.iter().flat_map(|r| r.added.iter().cloned()));
        let removed =
            self.collect_eligible(records.iter().flat_map(|r| r.removed.iter().cloned()));

        let candidates = added
            .iter()
            .filter(|(id, _)| !removed.contains_key(*id))
            .chain(removed.iter().filter(|(id, _)| !added.contains_key(*id)));
        for (_, node) in candidates {
            let Some(binder) = self.binders.get(node) else {
                continue;
            };
            let connected = node.is_connected();
            if binder.is_attached() == connected {
                continue;
            }
            log::error!(
                "node {node:?} was {} the document by a mutation that bypassed interception; correcting its lifecycle state",
                if connected { "inserted into" } else { "removed from" }
            );
            self.mismatches.set(self.mismatches.get() + 1);
            binder.force_attachment(connected);
        }
    }
}
