#![doc = r"Synchronous attachment-lifecycle tracking for node trees."]

pub mod async_watcher;
pub mod binder;
pub mod collections;
pub mod dom;
pub mod engine;
pub mod intercept;
pub mod mount;
pub mod platform;
pub mod projected_tree;
pub mod runtime;
pub mod sync_watcher;
pub mod value;

pub use async_watcher::ConsistencyWatchdog;
pub use binder::{Binder, InsertPhase, LifecycleHandler, WeakBinder};
pub use dom::{
    Arg, ChangeRecord, Document, DocumentBuilder, DocumentId, DomError, Namespace, Node, NodeId,
    NodeKind, ObserverHandle, Primitive, PrimitiveName, Prototype, RawMutations, WeakNode,
};
pub use engine::{binder, shutdown_watchdogs, EngineOptions, LifecycleEngine};
pub use intercept::{MutationHooks, PatchRegistry};
pub use mount::{
    bind_value, on_mount, unbind_value, BindOptions, Cleanup, IfAttached, MountError,
    MountOptions,
};
pub use platform::HostScheduler;
pub use projected_tree::{InsertOperation, ProjectedTreeState};
pub use runtime::{DefaultScheduler, HostRuntime, HostRuntimeHandle};
pub use sync_watcher::SyncMutationWatcher;
pub use value::{MaybeReactive, MutableValue, Observable, ValueError, ValueHandler};
