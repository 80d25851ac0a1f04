use std::fmt;
use std::rc::{Rc, Weak};

use super::{DocumentInner, Node};

/// One child-list change on `target`.
#[derive(Clone)]
pub struct ChangeRecord {
    pub target: Node,
    pub added: Vec<Node>,
    pub removed: Vec<Node>,
}

impl fmt::Debug for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRecord")
            .field("target", &self.target)
            .field("added", &self.added)
            .field("removed", &self.removed)
            .finish()
    }
}

pub type ChangeCallback = Rc<dyn Fn(Vec<ChangeRecord>)>;

pub(crate) struct ObserverState {
    id: u64,
    callback: ChangeCallback,
    pending: Vec<ChangeRecord>,
    scheduled: bool,
}

impl ObserverState {
    pub(crate) fn new(id: u64, callback: ChangeCallback) -> Self {
        Self {
            id,
            callback,
            pending: Vec::new(),
            scheduled: false,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Queues a record. Returns true when a delivery task must be scheduled.
    pub(crate) fn push(&mut self, record: ChangeRecord) -> bool {
        self.pending.push(record);
        !std::mem::replace(&mut self.scheduled, true)
    }

    pub(crate) fn take_batch(&mut self) -> (ChangeCallback, Vec<ChangeRecord>) {
        self.scheduled = false;
        (self.callback.clone(), std::mem::take(&mut self.pending))
    }
}

/// Keeps a change subscription registered until [`ObserverHandle::disconnect`]
/// is called. Dropping the handle does not disconnect.
#[derive(Debug)]
pub struct ObserverHandle {
    document: Weak<DocumentInner>,
    id: u64,
}

impl ObserverHandle {
    pub(crate) fn new(document: Weak<DocumentInner>, id: u64) -> Self {
        Self { document, id }
    }

    /// Stops delivery. Records queued but not yet delivered are dropped.
    pub fn disconnect(&self) {
        if let Some(document) = self.document.upgrade() {
            document.disconnect(self.id);
        }
    }
}
