//! Per-node lifecycle ledger.
//!
//! A [`Binder`] remembers whether its node is believed to be attached, which
//! callbacks run on insertion and removal, and which reactive values must be
//! subscribed only while the node is attached.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::collections::map::HashMap;
use crate::dom::{Node, NodeId, WeakNode};
use crate::value::{same_handler, Observable, ValueError, ValueHandler};

pub type LifecycleHandler = Rc<dyn Fn()>;

/// Which half of an insertion an insert handler runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertPhase {
    /// While the mutation is still in flight.
    Before,
    /// After the tree has settled for this operation.
    #[default]
    After,
}

trait WatchedEntry {
    /// Subscribes and catches the handler up with the live value.
    fn activate(&self);
    fn subscribe(&self);
    fn deactivate(&self);
    fn is_subscribed(&self) -> bool;
    fn handler_identity(&self) -> *const ();
}

struct WatchState<T> {
    last_known: RefCell<Option<T>>,
    subscribed: Cell<bool>,
    neutralized: Cell<bool>,
}

struct Watched<T> {
    source: Rc<dyn Observable<T>>,
    handler: ValueHandler<T>,
    forward: ValueHandler<T>,
    state: Rc<WatchState<T>>,
}

impl<T: Clone + PartialEq + 'static> Watched<T> {
    fn new(source: Rc<dyn Observable<T>>, handler: ValueHandler<T>) -> Self {
        let state = Rc::new(WatchState {
            last_known: RefCell::new(None),
            subscribed: Cell::new(false),
            neutralized: Cell::new(false),
        });
        let forward: ValueHandler<T> = {
            let state = state.clone();
            let handler = handler.clone();
            Rc::new(move |value: &T| {
                if state.neutralized.get() {
                    return;
                }
                *state.last_known.borrow_mut() = Some(value.clone());
                handler(value);
            })
        };
        Self {
            source,
            handler,
            forward,
            state,
        }
    }
}

impl<T: Clone + PartialEq + 'static> WatchedEntry for Watched<T> {
    fn activate(&self) {
        if self.state.subscribed.get() {
            return;
        }
        match self.source.get() {
            Ok(value) => {
                self.subscribe();
                let changed = self.state.last_known.borrow().as_ref() != Some(&value);
                if changed {
                    (self.forward)(&value);
                }
            }
            Err(err) => {
                log::error!("watched value could not be read on insertion, its updates are ignored until removal: {err}");
                self.state.neutralized.set(true);
                self.subscribe();
            }
        }
    }

    fn subscribe(&self) {
        if !self.state.subscribed.replace(true) {
            self.source.subscribe(&self.forward);
        }
    }

    fn deactivate(&self) {
        if self.state.subscribed.replace(false) {
            self.source.unsubscribe(&self.forward);
        }
        self.state.neutralized.set(false);
    }

    fn is_subscribed(&self) -> bool {
        self.state.subscribed.get()
    }

    fn handler_identity(&self) -> *const () {
        Rc::as_ptr(&self.handler) as *const ()
    }
}

struct BinderInner {
    node: WeakNode,
    attached: Cell<bool>,
    expecting_insertion: Cell<bool>,
    before_inserted: RefCell<Vec<LifecycleHandler>>,
    after_inserted: RefCell<Vec<LifecycleHandler>>,
    removed: RefCell<Vec<LifecycleHandler>>,
    watched: RefCell<Vec<Rc<dyn WatchedEntry>>>,
}

/// Lifecycle ledger of one node. Cloning yields another handle to the same
/// ledger.
#[derive(Clone)]
pub struct Binder {
    inner: Rc<BinderInner>,
}

#[derive(Clone)]
pub struct WeakBinder(Weak<BinderInner>);

impl WeakBinder {
    pub fn upgrade(&self) -> Option<Binder> {
        self.0.upgrade().map(|inner| Binder { inner })
    }
}

impl Binder {
    pub(crate) fn new(node: &Node, attached: bool) -> Self {
        Self {
            inner: Rc::new(BinderInner {
                node: node.downgrade(),
                attached: Cell::new(attached),
                expecting_insertion: Cell::new(false),
                before_inserted: RefCell::new(Vec::new()),
                after_inserted: RefCell::new(Vec::new()),
                removed: RefCell::new(Vec::new()),
                watched: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn node(&self) -> Option<Node> {
        self.inner.node.upgrade()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.get()
    }

    pub fn is_expecting_insertion(&self) -> bool {
        self.inner.expecting_insertion.get()
    }

    pub fn downgrade(&self) -> WeakBinder {
        WeakBinder(Rc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Binder) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn insert_list(&self, phase: InsertPhase) -> &RefCell<Vec<LifecycleHandler>> {
        match phase {
            InsertPhase::Before => &self.inner.before_inserted,
            InsertPhase::After => &self.inner.after_inserted,
        }
    }

    /// Registers `handler` for the given insertion phase.
    ///
    /// Handlers live as long as the binder, and the binder lives as long as
    /// its node. A handler that captures its own node strongly therefore
    /// keeps the node alive for good; capture a [`WeakNode`] from
    /// [`Node::downgrade`] instead.
    ///
    /// [`WeakNode`]: crate::WeakNode
    /// [`Node::downgrade`]: crate::Node::downgrade
    pub fn on_inserted(&self, handler: LifecycleHandler, phase: InsertPhase) {
        self.insert_list(phase).borrow_mut().push(handler);
    }

    pub fn off_inserted(&self, handler: &LifecycleHandler, phase: InsertPhase) {
        drop_handler(self.insert_list(phase), handler);
    }

    /// Registers `handler` for removals. The same ownership rule as
    /// [`on_inserted`](Self::on_inserted) applies: capture the node weakly.
    pub fn on_removed(&self, handler: LifecycleHandler) {
        self.inner.removed.borrow_mut().push(handler);
    }

    pub fn off_removed(&self, handler: &LifecycleHandler) {
        drop_handler(&self.inner.removed, handler);
    }

    /// First half of an insertion. A no-op while already attached.
    pub fn notify_before_inserted(&self) {
        if self.inner.attached.replace(true) {
            return;
        }
        self.inner.expecting_insertion.set(true);
        let entries = self.inner.watched.borrow().clone();
        for entry in entries {
            // A value handler may have detached the node again.
            if !self.is_attached() {
                return;
            }
            entry.activate();
        }
        self.fire(&self.inner.before_inserted, true);
    }

    /// Second half of an insertion; only runs after a matching
    /// [`notify_before_inserted`](Self::notify_before_inserted).
    pub fn notify_after_inserted(&self) {
        if !self.inner.expecting_insertion.replace(false) {
            return;
        }
        self.fire(&self.inner.after_inserted, true);
    }

    pub fn notify_after_removed(&self) {
        if !self.inner.attached.replace(false) {
            return;
        }
        self.inner.expecting_insertion.set(false);
        let entries = self.inner.watched.borrow().clone();
        for entry in entries {
            entry.deactivate();
        }
        self.fire(&self.inner.removed, false);
    }

    /// Drives the ledger to `attached` through the regular entry points.
    pub(crate) fn force_attachment(&self, attached: bool) {
        if attached {
            self.notify_before_inserted();
            self.notify_after_inserted();
        } else {
            self.notify_after_removed();
        }
    }

    // Handlers run from a snapshot; the pass stops once a handler flips the
    // attachment state.
    fn fire(&self, list: &RefCell<Vec<LifecycleHandler>>, while_attached: bool) {
        let handlers = list.borrow().clone();
        for handler in handlers {
            if self.is_attached() != while_attached {
                break;
            }
            handler();
        }
    }

    /// Tracks `value` while the node is attached. Nothing is delivered now;
    /// the next insertion delivers the current value.
    pub fn watch<T: Clone + PartialEq + 'static>(
        &self,
        value: Rc<dyn Observable<T>>,
        handler: ValueHandler<T>,
    ) {
        self.register(Watched::new(value, handler));
    }

    /// Like [`watch`](Self::watch), and delivers the current value right
    /// away regardless of attachment. A failed read registers nothing.
    pub fn watch_and_run<T: Clone + PartialEq + 'static>(
        &self,
        value: Rc<dyn Observable<T>>,
        handler: ValueHandler<T>,
    ) -> Result<(), ValueError> {
        let current = value.get()?;
        let watched = Rc::new(Watched::new(value, handler));
        let forward = watched.forward.clone();
        self.register_rc(watched);
        forward(&current);
        Ok(())
    }

    fn register<T: Clone + PartialEq + 'static>(&self, watched: Watched<T>) {
        self.register_rc(Rc::new(watched));
    }

    fn register_rc(&self, watched: Rc<dyn WatchedEntry>) {
        if self.is_attached() {
            watched.subscribe();
        }
        self.inner.watched.borrow_mut().push(watched);
    }

    /// Drops every watch registered with `handler`.
    pub fn unwatch<T: 'static>(&self, handler: &ValueHandler<T>) {
        let identity = Rc::as_ptr(handler) as *const ();
        let removed: Vec<Rc<dyn WatchedEntry>> = {
            let mut watched = self.inner.watched.borrow_mut();
            let (removed, kept): (Vec<_>, Vec<_>) = watched
                .drain(..)
                .partition(|entry| std::ptr::eq(entry.handler_identity(), identity));
            *watched = kept;
            removed
        };
        for entry in removed {
            entry.deactivate();
        }
    }

    pub fn watched_count(&self) -> usize {
        self.inner.watched.borrow().len()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner
            .watched
            .borrow()
            .iter()
            .filter(|entry| entry.is_subscribed())
            .count()
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("node", &self.inner.node)
            .field("attached", &self.inner.attached.get())
            .field("expecting_insertion", &self.inner.expecting_insertion.get())
            .field("watched", &self.watched_count())
            .finish()
    }
}

fn drop_handler(list: &RefCell<Vec<LifecycleHandler>>, handler: &LifecycleHandler) {
    list.borrow_mut()
        .retain(|existing| !same_handler(existing, handler));
}

/// Node to ledger association. Holds nodes weakly; dead entries are pruned
/// every `prune_interval` insertions.
pub(crate) struct BinderTable {
    entries: RefCell<HashMap<NodeId, (WeakNode, Binder)>>,
    inserts_since_prune: Cell<usize>,
    prune_interval: usize,
}

impl BinderTable {
    pub(crate) fn new(prune_interval: usize) -> Self {
        Self {
            entries: RefCell::new(HashMap::default()),
            inserts_since_prune: Cell::new(0),
            prune_interval: prune_interval.max(1),
        }
    }

    pub(crate) fn get(&self, node: &Node) -> Option<Binder> {
        self.entries
            .borrow()
            .get(&node.id())
            .map(|(_, binder)| binder.clone())
    }

    pub(crate) fn get_or_create(&self, node: &Node, attached: impl FnOnce() -> bool) -> Binder {
        if let Some(binder) = self.get(node) {
            return binder;
        }
        let binder = Binder::new(node, attached());
        self.entries
            .borrow_mut()
            .insert(node.id(), (node.downgrade(), binder.clone()));
        let inserts = self.inserts_since_prune.get() + 1;
        if inserts >= self.prune_interval {
            self.prune();
        } else {
            self.inserts_since_prune.set(inserts);
        }
        binder
    }

    /// Ledgers of `node` and its descendants, in pre-order.
    pub(crate) fn collect_subtree(&self, node: &Node) -> Vec<(Node, Binder)> {
        let entries = self.entries.borrow();
        if entries.is_empty() {
            return Vec::new();
        }
        let collected = node
            .subtree()
            .into_iter()
            .filter_map(|descendant| {
                let binder = entries.get(&descendant.id())?.1.clone();
                Some((descendant, binder))
            })
            .collect();
        collected
    }

    pub(crate) fn contains(&self, node: &Node) -> bool {
        self.entries.borrow().contains_key(&node.id())
    }

    /// Drops entries whose node is gone. Returns how many were dropped.
    pub(crate) fn prune(&self) -> usize {
        self.inserts_since_prune.set(0);
        // Ledgers are dropped after the borrow ends; their handlers may own
        // arbitrary state.
        let dead: Vec<(WeakNode, Binder)> = {
            let mut entries = self.entries.borrow_mut();
            let ids: Vec<NodeId> = entries
                .iter()
                .filter(|(_, (node, _))| !node.is_alive())
                .map(|(id, _)| *id)
                .collect();
            let dead = ids.iter().filter_map(|id| entries.remove(id)).collect();
            dead
        };
        dead.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

#[cfg(test)]
#[path = "tests/binder_tests.rs"]
mod tests;
