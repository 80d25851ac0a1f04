use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::platform::HostScheduler;

pub(crate) type Task = Box<dyn FnOnce() + 'static>;

struct RuntimeInner {
    scheduler: Arc<dyn HostScheduler>,
    needs_tasks: Cell<bool>,
    pending_tasks: RefCell<VecDeque<Task>>, // FUTURE(no_std): migrate to ring buffer.
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn HostScheduler>) -> Self {
        Self {
            scheduler,
            needs_tasks: Cell::new(false),
            pending_tasks: RefCell::new(VecDeque::new()),
        }
    }

    fn enqueue_task(&self, task: Task) {
        self.pending_tasks.borrow_mut().push_back(task);
        if !self.needs_tasks.replace(true) {
            self.scheduler.request_tasks();
        }
    }

    fn drain_tasks(&self) {
        let tasks: Vec<Task> = {
            let mut pending = self.pending_tasks.borrow_mut();
            pending.drain(..).collect()
        };
        for task in tasks {
            task();
        }
        if self.pending_tasks.borrow().is_empty() {
            self.needs_tasks.set(false);
        }
    }

    fn has_tasks(&self) -> bool {
        !self.pending_tasks.borrow().is_empty()
    }
}

/// Task queue of one document: the host's notion of "later, after the
/// current synchronous turn".
#[derive(Clone)]
pub struct HostRuntime {
    inner: Rc<RuntimeInner>,
}

impl HostRuntime {
    pub fn new(scheduler: Arc<dyn HostScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> HostRuntimeHandle {
        HostRuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn spawn_task(&self, task: impl FnOnce() + 'static) {
        self.inner.enqueue_task(Box::new(task));
    }

    /// Runs every task queued so far. Tasks queued by those tasks stay
    /// pending until the next call.
    pub fn drain_tasks(&self) {
        self.inner.drain_tasks();
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.inner.has_tasks()
    }

    pub fn needs_tasks(&self) -> bool {
        self.inner.needs_tasks.get()
    }
}

#[derive(Default)]
pub struct DefaultScheduler;

impl HostScheduler for DefaultScheduler {
    fn request_tasks(&self) {}
}

#[derive(Clone)]
pub struct HostRuntimeHandle(Weak<RuntimeInner>);

impl HostRuntimeHandle {
    pub fn spawn_task(&self, task: impl FnOnce() + 'static) {
        if let Some(inner) = self.0.upgrade() {
            inner.enqueue_task(Box::new(task));
        }
    }

    pub fn drain_tasks(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.drain_tasks();
        }
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.has_tasks())
            .unwrap_or(false)
    }
}
