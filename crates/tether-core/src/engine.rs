//! Wiring of the lifecycle engine for one document.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::thread_local;

use crate::async_watcher::ConsistencyWatchdog;
use crate::binder::{Binder, BinderTable};
use crate::dom::{Document, Node, PrimitiveName, Prototype};
use crate::intercept::{self, MutationHooks, PatchRegistry};
use crate::sync_watcher::SyncMutationWatcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Run the batched cross-check against the document's change records.
    pub consistency_watchdog: bool,
    /// Ledger creations between sweeps of entries whose node is gone.
    pub prune_interval: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            consistency_watchdog: true,
            prune_interval: 64,
        }
    }
}

struct EngineInner {
    document: Document,
    binders: Rc<BinderTable>,
    sync: Rc<SyncMutationWatcher>,
    watchdog: Rc<ConsistencyWatchdog>,
    registry: RefCell<PatchRegistry>,
    options: EngineOptions,
}

/// Lifecycle tracking installed on a document.
#[derive(Clone)]
pub struct LifecycleEngine {
    inner: Rc<EngineInner>,
}

thread_local! {
    static ENGINES: RefCell<Vec<LifecycleEngine>> = RefCell::new(Vec::new());
}

impl LifecycleEngine {
    /// Intercepts `document`'s mutation primitives and starts tracking.
    /// Installing on a document that already has an engine returns that
    /// engine unchanged.
    pub fn install(document: &Document, options: EngineOptions) -> Self {
        if let Some(existing) = Self::for_document(document) {
            log::debug!("lifecycle engine already installed on {document:?}");
            return existing;
        }
        let binders = Rc::new(BinderTable::new(options.prune_interval));
        let sync = Rc::new(SyncMutationWatcher::new(binders.clone()));
        let watchdog = Rc::new(ConsistencyWatchdog::new(binders.clone()));

        let hooks: Rc<dyn MutationHooks> = sync.clone();
        let mut registry = PatchRegistry::new();
        intercept::install(document, &hooks, &mut registry);
        if options.consistency_watchdog {
            watchdog.start(document);
        }
        log::debug!(
            "lifecycle engine installed on {document:?}: {} primitives wrapped, {} missing",
            registry.installed().len(),
            registry.missing().len()
        );

        let engine = Self {
            inner: Rc::new(EngineInner {
                document: document.clone(),
                binders,
                sync,
                watchdog,
                registry: RefCell::new(registry),
                options,
            }),
        };
        ENGINES.with(|engines| engines.borrow_mut().push(engine.clone()));
        engine
    }

    /// The engine installed on `document` by this thread, if any.
    pub fn for_document(document: &Document) -> Option<Self> {
        ENGINES.with(|engines| {
            engines
                .borrow()
                .iter()
                .find(|engine| engine.inner.document.ptr_eq(document))
                .cloned()
        })
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// Ledger of `node`, created on first request.
    ///
    /// # Panics
    ///
    /// Panics if `node` belongs to a different document.
    pub fn binder(&self, node: &Node) -> Binder {
        let same_document = node
            .document()
            .is_some_and(|document| document.ptr_eq(&self.inner.document));
        assert!(
            same_document,
            "node {node:?} does not belong to the document this engine tracks"
        );
        let sync = &self.inner.sync;
        self.inner
            .binders
            .get_or_create(node, || sync.is_inserted(node))
    }

    pub fn existing_binder(&self, node: &Node) -> Option<Binder> {
        self.inner.binders.get(node)
    }

    /// Connected, or expected to be once the mutation in flight completes.
    pub fn is_inserted(&self, node: &Node) -> bool {
        self.inner.sync.is_inserted(node)
    }

    /// Stops the batched cross-check. Synchronous tracking is unaffected.
    pub fn shutdown_watchdog(&self) {
        if self.inner.watchdog.is_active() {
            self.inner.watchdog.shutdown();
            log::debug!("consistency watchdog stopped for {:?}", self.inner.document);
        }
    }

    pub fn watchdog_active(&self) -> bool {
        self.inner.watchdog.is_active()
    }

    /// Number of disagreements the watchdog found and corrected.
    pub fn mismatch_count(&self) -> usize {
        self.inner.watchdog.mismatch_count()
    }

    /// Ledgers whose node is still alive.
    pub fn tracked_nodes(&self) -> usize {
        self.inner.binders.prune();
        self.inner.binders.len()
    }

    pub fn installed_primitives(&self) -> Vec<(Prototype, PrimitiveName)> {
        self.inner.registry.borrow().installed().to_vec()
    }

    pub fn missing_primitives(&self) -> Vec<PrimitiveName> {
        self.inner.registry.borrow().missing().to_vec()
    }

    /// Restores the original primitives, stops the watchdog and forgets this
    /// engine. Existing ledgers stay usable but receive no more
    /// notifications.
    pub fn uninstall(&self) {
        self.shutdown_watchdog();
        intercept::uninstall(&self.inner.document, &mut self.inner.registry.borrow_mut());
        ENGINES.with(|engines| {
            engines
                .borrow_mut()
                .retain(|engine| !Rc::ptr_eq(&engine.inner, &self.inner))
        });
        log::debug!("lifecycle engine uninstalled from {:?}", self.inner.document);
    }
}

impl fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("document", &self.inner.document)
            .field("tracked", &self.inner.binders.len())
            .field("watchdog", &self.watchdog_active())
            .finish()
    }
}

/// Ledger of `node` from the engine installed on its document.
///
/// # Panics
///
/// Panics if no engine has been installed for the node's document on this
/// thread. Asking for lifecycle tracking before installing is a programming
/// error.
pub fn binder(node: &Node) -> Binder {
    let engine = node
        .document()
        .and_then(|document| LifecycleEngine::for_document(&document))
        .expect("no lifecycle engine installed for this node's document; call LifecycleEngine::install first");
    engine.binder(node)
}

/// Stops the watchdog of every engine on this thread.
pub fn shutdown_watchdogs() {
    let engines = ENGINES.with(|engines| engines.borrow().clone());
    for engine in engines {
        engine.shutdown_watchdog();
    }
}
