//! Platform abstraction traits for host task scheduling.
//!
//! The host decides when queued tasks (change-record deliveries, for
//! instance) actually run. These traits let the tree model ask for that
//! without depending on a particular event loop.

/// Schedules deferred work on behalf of a document.
///
/// Implementations must be safe to share between threads; the tasks
/// themselves always run on the thread that owns the document.
pub trait HostScheduler: Send + Sync {
    /// Request that the host drain the document's task queue soon.
    fn request_tasks(&self);
}
