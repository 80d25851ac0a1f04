//! Convenience layer over [`Binder`] for element builders.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::binder::{Binder, InsertPhase, LifecycleHandler};
use crate::dom::{Node, NodeId};
use crate::engine::binder;
use crate::value::{MaybeReactive, ValueError, ValueHandler};

/// Runs once on the next removal after the mount handler that returned it.
pub type Cleanup = Box<dyn FnOnce()>;

/// What [`on_mount`] does when the node is attached already.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfAttached {
    /// Return [`MountError::AlreadyAttached`] and register nothing.
    #[default]
    Fail,
    /// Register the handler for future insertions only.
    Ignore,
    /// Run the handler now, then register it.
    Call,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MountOptions {
    pub phase: InsertPhase,
    pub if_attached: IfAttached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindOptions {
    /// Do not run the handler with the current value.
    pub skip_initial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountError {
    AlreadyAttached { node: NodeId },
}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountError::AlreadyAttached { node } => {
                write!(f, "node {node} is already attached to the document")
            }
        }
    }
}

impl std::error::Error for MountError {}

/// Runs `handler` every time `node` is inserted. A returned cleanup runs on
/// the following removal.
pub fn on_mount(
    node: &Node,
    handler: impl Fn() -> Option<Cleanup> + 'static,
    options: MountOptions,
) -> Result<(), MountError> {
    let binder = binder(node);
    let weak = binder.downgrade();
    let mounted: LifecycleHandler = Rc::new(move || {
        let cleanup = handler();
        if let (Some(cleanup), Some(binder)) = (cleanup, weak.upgrade()) {
            register_cleanup(&binder, cleanup);
        }
    });

    if binder.is_attached() {
        match options.if_attached {
            IfAttached::Fail => return Err(MountError::AlreadyAttached { node: node.id() }),
            IfAttached::Ignore => {}
            IfAttached::Call => mounted(),
        }
    }
    binder.on_inserted(mounted, options.phase);
    Ok(())
}

fn register_cleanup(binder: &Binder, cleanup: Cleanup) {
    let slot: Rc<RefCell<Option<Weak<dyn Fn()>>>> = Rc::default();
    let weak_binder = binder.downgrade();
    let pending = RefCell::new(Some(cleanup));
    let on_removed: LifecycleHandler = {
        let slot = slot.clone();
        Rc::new(move || {
            let me = slot.borrow_mut().take().and_then(|me| me.upgrade());
            if let (Some(binder), Some(me)) = (weak_binder.upgrade(), me) {
                binder.off_removed(&me);
            }
            let cleanup = pending.borrow_mut().take();
            if let Some(cleanup) = cleanup {
                cleanup();
            }
        })
    };
    *slot.borrow_mut() = Some(Rc::downgrade(&on_removed));
    binder.on_removed(on_removed);
}

/// Feeds `value` to `handler`. Plain values are delivered once; reactive
/// ones stay bound while the node is attached.
pub fn bind_value<T: Clone + PartialEq + 'static>(
    node: &Node,
    value: MaybeReactive<T>,
    handler: ValueHandler<T>,
    options: BindOptions,
) -> Result<(), ValueError> {
    match value {
        MaybeReactive::Plain(value) => {
            if !options.skip_initial {
                handler(&value);
            }
            Ok(())
        }
        MaybeReactive::Reactive(value) if options.skip_initial => {
            binder(node).watch(value, handler);
            Ok(())
        }
        MaybeReactive::Reactive(value) => binder(node).watch_and_run(value, handler),
    }
}

pub fn unbind_value<T: 'static>(node: &Node, handler: &ValueHandler<T>) {
    binder(node).unwatch(handler);
}
