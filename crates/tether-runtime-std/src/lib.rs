//! Standard host task queue backed by Rust's `std` library.
//!
//! A document built by [`StdHost`] reports queued work to a shared
//! [`TaskSignal`]. The host thread either polls the host between its own
//! events or parks on the signal until the document asks for a turn; in
//! both cases the queued change records reach their observers when the
//! host drains the document.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tether_core::{Document, DocumentBuilder, EngineOptions, HostScheduler, LifecycleEngine};

/// Count of task turns a document has asked for and the host has not
/// taken yet.
///
/// The signal is `Send + Sync`, so a thread that does not own the document
/// can still wait on it and wake the owner some other way.
#[derive(Default)]
pub struct TaskSignal {
    requested: Mutex<usize>,
    raised: Condvar,
}

impl TaskSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn requested(&self) -> MutexGuard<'_, usize> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a turn has been requested and not taken.
    pub fn is_raised(&self) -> bool {
        *self.requested() > 0
    }

    /// Clears the signal and returns how many turns were requested since
    /// the last take.
    pub fn take(&self) -> usize {
        std::mem::take(&mut *self.requested())
    }

    /// Blocks until a turn is requested or `timeout` elapses. Returns
    /// whether the signal is raised; the request is left for [`take`].
    ///
    /// [`take`]: Self::take
    pub fn wait(&self, timeout: Duration) -> bool {
        let (requested, _) = self
            .raised
            .wait_timeout_while(self.requested(), timeout, |requested| *requested == 0)
            .unwrap_or_else(PoisonError::into_inner);
        *requested > 0
    }
}

impl fmt::Debug for TaskSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSignal")
            .field("requested", &*self.requested())
            .finish()
    }
}

impl HostScheduler for TaskSignal {
    fn request_tasks(&self) {
        *self.requested() += 1;
        self.raised.notify_all();
    }
}

/// A document whose task queue is drained by the calling thread, optionally
/// with lifecycle tracking installed.
#[derive(Clone)]
pub struct StdHost {
    document: Document,
    signal: Arc<TaskSignal>,
}

impl StdHost {
    pub fn new() -> Self {
        Self::with_builder(Document::builder())
    }

    /// Builds the document from `builder`, replacing its scheduler.
    pub fn with_builder(builder: DocumentBuilder) -> Self {
        let signal = Arc::new(TaskSignal::new());
        let document = builder.scheduler(signal.clone()).build();
        Self { document, signal }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn signal(&self) -> Arc<TaskSignal> {
        Arc::clone(&self.signal)
    }

    /// Installs lifecycle tracking on the document.
    pub fn install_engine(&self, options: EngineOptions) -> LifecycleEngine {
        LifecycleEngine::install(&self.document, options)
    }

    /// Drains queued tasks if a turn was requested. Returns whether it did.
    pub fn poll(&self) -> bool {
        let turns = self.signal.take();
        if turns == 0 {
            return false;
        }
        log::trace!("draining {turns} requested task turn(s) for {:?}", self.document);
        self.document.run_pending_tasks();
        true
    }

    /// Waits up to `timeout` for the document to request a turn, then
    /// drains it.
    pub fn poll_timeout(&self, timeout: Duration) -> bool {
        self.signal.wait(timeout) && self.poll()
    }
}

impl Default for StdHost {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdHost")
            .field("document", &self.document)
            .field("signal", &self.signal)
            .finish()
    }
}
