//! Testing utilities and fixtures for Tether.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use tether_core::{
    bind_value, BindOptions, Binder, Document, EngineOptions, InsertPhase, LifecycleEngine,
    LifecycleHandler, MutableValue, Node, ValueHandler,
};

/// Routes `log` output through `env_logger` in test mode. Safe to call from
/// every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A document with lifecycle tracking installed.
pub struct Fixture {
    pub document: Document,
    pub engine: LifecycleEngine,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self::with_document(Document::new(), options)
    }

    pub fn with_document(document: Document, options: EngineOptions) -> Self {
        init_logging();
        let engine = LifecycleEngine::install(&document, options);
        Self { document, engine }
    }

    pub fn body(&self) -> Node {
        self.document.body()
    }

    pub fn element(&self, tag: &str) -> Node {
        self.document.create_element(tag)
    }

    pub fn binder(&self, node: &Node) -> Binder {
        self.engine.binder(node)
    }

    /// Element with every lifecycle event of its ledger logged as
    /// `"<label>:before"`, `"<label>:after"` or `"<label>:removed"`.
    pub fn tracked(&self, label: &str, log: &CallLog) -> Node {
        let node = self.element(label);
        log.track(&self.binder(&node), label);
        node
    }

    /// Element holding one text node that mirrors `value` while attached.
    pub fn text_bound(&self, tag: &str, value: &MutableValue<String>) -> Node {
        let node = self.element(tag);
        let text = self.document.create_text("");
        node.append_child(&text).expect("append text to fresh element");
        let weak = text.downgrade();
        let handler: ValueHandler<String> = Rc::new(move |value: &String| {
            if let Some(text) = weak.upgrade() {
                text.set_text_content(value).expect("set text data");
            }
        });
        bind_value(&node, value.into(), handler, BindOptions::default())
            .expect("bound value is readable");
        node
    }

    /// Element with a single text child.
    pub fn text_element(&self, tag: &str, text: &str) -> Node {
        let node = self.element(tag);
        node.append_child(&self.document.create_text(text))
            .expect("append text to fresh element");
        node
    }

    /// Runs queued host tasks, delivering change records to the watchdog.
    pub fn settle(&self) {
        self.document.run_pending_tasks();
    }

    /// Settles and asserts the watchdog found nothing to correct.
    pub fn assert_consistent(&self) {
        self.settle();
        assert_eq!(
            self.engine.mismatch_count(),
            0,
            "consistency watchdog found mismatches"
        );
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.engine.uninstall();
    }
}

/// Ordered record of labelled events.
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Rc<RefCell<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    /// Handler that appends `entry` each time it runs.
    pub fn handler(&self, entry: &str) -> LifecycleHandler {
        let log = self.clone();
        let entry = entry.to_owned();
        Rc::new(move || log.push(entry.clone()))
    }

    pub fn track(&self, binder: &Binder, label: &str) {
        binder.on_inserted(self.handler(&format!("{label}:before")), InsertPhase::Before);
        binder.on_inserted(self.handler(&format!("{label}:after")), InsertPhase::After);
        binder.on_removed(self.handler(&format!("{label}:removed")));
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|existing| existing.as_str() == entry)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Debug for CallLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.borrow().iter()).finish()
    }
}

/// Collects every value delivered to its handler.
pub struct ValueRecorder<T> {
    seen: Rc<RefCell<Vec<T>>>,
    handler: ValueHandler<T>,
}

impl<T: Clone + 'static> ValueRecorder<T> {
    pub fn new() -> Self {
        let seen: Rc<RefCell<Vec<T>>> = Rc::default();
        let handler: ValueHandler<T> = {
            let seen = seen.clone();
            Rc::new(move |value: &T| seen.borrow_mut().push(value.clone()))
        };
        Self { seen, handler }
    }

    pub fn handler(&self) -> ValueHandler<T> {
        self.handler.clone()
    }

    pub fn seen(&self) -> Vec<T> {
        self.seen.borrow().clone()
    }

    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.seen.borrow_mut())
    }
}

impl<T: Clone + 'static> Default for ValueRecorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Debug> Debug for ValueRecorder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueRecorder")
            .field("seen", &*self.seen.borrow())
            .finish()
    }
}

/// Asserts `log` holds exactly `expected`, then clears it.
#[track_caller]
pub fn assert_log(log: &CallLog, expected: &[&str]) {
    let entries = log.take();
    assert_eq!(entries, expected, "unexpected lifecycle events");
}
