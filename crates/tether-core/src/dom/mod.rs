//! In-memory model of the host document tree.
//!
//! Every tree-mutating entry point on [`Node`] is dispatched through the
//! document's primitive tables (see [`Prototype`]), which is what makes the
//! mutations interceptable. The tree itself knows nothing about lifecycle
//! tracking.

mod primitives;
mod records;

pub use primitives::{Arg, Primitive, PrimitiveFn, PrimitiveName, Prototype, RawMutations};
pub use records::{ChangeCallback, ChangeRecord, ObserverHandle};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::platform::HostScheduler;
use crate::runtime::{DefaultScheduler, HostRuntime};

use primitives::PrototypeTables;
use records::ObserverState;

pub type NodeId = u64;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_node_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Html,
    Svg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element { tag: String, namespace: Namespace },
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    /// The insertion would create a cycle or put a node where it cannot live.
    HierarchyRequest { parent: NodeId, child: NodeId },
    /// A reference node is not a child of the node it was expected under.
    NotFound { parent: NodeId, child: NodeId },
    /// The node and the target belong to different documents.
    WrongDocument { node: NodeId },
    /// No prototype in the node's chain provides this primitive.
    MissingPrimitive { name: PrimitiveName },
    /// A required argument is absent or of the wrong kind.
    InvalidArgument { name: PrimitiveName, index: usize },
    InvalidPosition(String),
    /// A primitive that must return a node returned nothing.
    NoResult { name: PrimitiveName },
    /// The owning document has been dropped.
    Detached { node: NodeId },
}

impl fmt::Display for DomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomError::HierarchyRequest { parent, child } => {
                write!(f, "node {child} cannot be inserted under node {parent}")
            }
            DomError::NotFound { parent, child } => {
                write!(f, "node {child} is not a child of node {parent}")
            }
            DomError::WrongDocument { node } => {
                write!(f, "node {node} belongs to another document")
            }
            DomError::MissingPrimitive { name } => {
                write!(f, "primitive {} is not available on this platform", name.as_str())
            }
            DomError::InvalidArgument { name, index } => {
                write!(f, "invalid argument {index} for {}", name.as_str())
            }
            DomError::InvalidPosition(position) => {
                write!(f, "invalid adjacent position {position:?}")
            }
            DomError::NoResult { name } => {
                write!(f, "{} returned no node", name.as_str())
            }
            DomError::Detached { node } => write!(f, "document of node {node} is gone"),
        }
    }
}

impl std::error::Error for DomError {}

pub(crate) struct NodeData {
    id: NodeId,
    kind: NodeKind,
    text: RefCell<String>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Node>>, // FUTURE(no_std): migrate to arena-backed child lists.
    document: Weak<DocumentInner>,
}

/// Handle to a tree node. Equality and hashing follow node identity.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

/// Non-owning node handle; never keeps a detached node alive.
#[derive(Clone, Default)]
pub struct WeakNode(Weak<NodeData>);

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(node) => write!(f, "WeakNode({node:?})"),
            None => f.write_str("WeakNode(<dropped>)"),
        }
    }
}

impl Node {
    fn new(kind: NodeKind, text: String, document: Weak<DocumentInner>) -> Self {
        Node(Rc::new(NodeData {
            id: next_node_id(),
            kind,
            text: RefCell::new(text),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            document,
        }))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.0.kind, NodeKind::Text)
    }

    pub fn prototype(&self) -> Prototype {
        match &self.0.kind {
            NodeKind::Document => Prototype::Node,
            NodeKind::Text => Prototype::CharacterData,
            NodeKind::Element {
                namespace: Namespace::Html,
                ..
            } => Prototype::HtmlElement,
            NodeKind::Element {
                namespace: Namespace::Svg,
                ..
            } => Prototype::SvgElement,
        }
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    pub fn document(&self) -> Option<Document> {
        self.0.document.upgrade().map(|inner| Document { inner })
    }

    pub(crate) fn document_id(&self) -> Option<DocumentId> {
        self.0.document.upgrade().map(|inner| inner.id)
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Snapshot of the current children.
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    pub fn index_in_parent(&self) -> Option<usize> {
        let parent = self.parent()?;
        let children = parent.0.children.borrow();
        let index = children.iter().position(|child| child == self);
        index
    }

    /// True when the node is reachable from its document's root.
    pub fn is_connected(&self) -> bool {
        let mut current = self.clone();
        loop {
            if matches!(current.0.kind, NodeKind::Document) {
                return true;
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Inclusive ancestor check: `self == other` or `other` is below `self`.
    pub fn contains(&self, other: &Node) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if &node == self {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// The node and all of its descendants in pre-order.
    pub fn subtree(&self) -> Vec<Node> {
        let mut result = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            {
                let children = node.0.children.borrow();
                stack.extend(children.iter().rev().cloned());
            }
            result.push(node);
        }
        result
    }

    /// Concatenated text of the subtree, like `textContent`.
    pub fn text_content(&self) -> String {
        if self.is_text() {
            return self.0.text.borrow().clone();
        }
        self.subtree()
            .iter()
            .filter(|node| node.is_text())
            .map(|node| node.0.text.borrow().clone())
            .collect()
    }

    fn dispatch(&self, name: PrimitiveName, args: &[Arg]) -> Result<Option<Node>, DomError> {
        let document = self.document().ok_or(DomError::Detached { node: self.id() })?;
        let primitive = document
            .resolve(self.prototype(), name)
            .ok_or(DomError::MissingPrimitive { name })?;
        primitive.call(self, args)
    }

    fn dispatch_node(&self, name: PrimitiveName, args: &[Arg]) -> Result<Node, DomError> {
        self.dispatch(name, args)?.ok_or(DomError::NoResult { name })
    }

    pub fn append_child(&self, child: &Node) -> Result<Node, DomError> {
        self.dispatch_node(PrimitiveName::AppendChild, &[Arg::from(child)])
    }

    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) -> Result<Node, DomError> {
        match reference {
            Some(reference) => self.dispatch_node(
                PrimitiveName::InsertBefore,
                &[Arg::from(child), Arg::from(reference)],
            ),
            None => self.dispatch_node(PrimitiveName::InsertBefore, &[Arg::from(child)]),
        }
    }

    pub fn append(&self, items: &[Arg]) -> Result<(), DomError> {
        self.dispatch(PrimitiveName::Append, items).map(drop)
    }

    pub fn prepend(&self, items: &[Arg]) -> Result<(), DomError> {
        self.dispatch(PrimitiveName::Prepend, items).map(drop)
    }

    pub fn before(&self, items: &[Arg]) -> Result<(), DomError> {
        self.dispatch(PrimitiveName::Before, items).map(drop)
    }

    pub fn after(&self, items: &[Arg]) -> Result<(), DomError> {
        self.dispatch(PrimitiveName::After, items).map(drop)
    }

    /// `position` is one of `beforebegin`, `afterbegin`, `beforeend`, `afterend`.
    pub fn insert_adjacent_element(
        &self,
        position: &str,
        element: &Node,
    ) -> Result<Option<Node>, DomError> {
        self.dispatch(
            PrimitiveName::InsertAdjacentElement,
            &[Arg::from(position), Arg::from(element)],
        )
    }

    pub fn remove_child(&self, child: &Node) -> Result<Node, DomError> {
        self.dispatch_node(PrimitiveName::RemoveChild, &[Arg::from(child)])
    }

    pub fn remove(&self) -> Result<(), DomError> {
        self.dispatch(PrimitiveName::Remove, &[]).map(drop)
    }

    /// Replaces `old` with `new`, returning `old`.
    pub fn replace_child(&self, new: &Node, old: &Node) -> Result<Node, DomError> {
        self.dispatch_node(PrimitiveName::ReplaceChild, &[Arg::from(new), Arg::from(old)])
    }

    pub fn replace_children(&self, items: &[Arg]) -> Result<(), DomError> {
        self.dispatch(PrimitiveName::ReplaceChildren, items).map(drop)
    }

    pub fn replace_with(&self, items: &[Arg]) -> Result<(), DomError> {
        self.dispatch(PrimitiveName::ReplaceWith, items).map(drop)
    }

    pub fn set_inner_html(&self, markup: &str) -> Result<(), DomError> {
        self.dispatch(PrimitiveName::SetInnerHtml, &[Arg::from(markup)])
            .map(drop)
    }

    pub fn set_outer_html(&self, markup: &str) -> Result<(), DomError> {
        self.dispatch(PrimitiveName::SetOuterHtml, &[Arg::from(markup)])
            .map(drop)
    }

    pub fn set_html(&self, markup: &str) -> Result<(), DomError> {
        self.dispatch(PrimitiveName::SetHtml, &[Arg::from(markup)])
            .map(drop)
    }

    pub fn set_text_content(&self, text: &str) -> Result<(), DomError> {
        self.dispatch(PrimitiveName::SetTextContent, &[Arg::from(text)])
            .map(drop)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            NodeKind::Document => write!(f, "#{} <#document>", self.0.id),
            NodeKind::Element { tag, .. } => write!(f, "#{} <{tag}>", self.0.id),
            NodeKind::Text => write!(f, "#{} {:?}", self.0.id, self.0.text.borrow()),
        }
    }
}

// Structural helpers shared by the native primitives. They never consult the
// primitive tables, so nothing here is observable by interception.

pub(crate) fn detach(child: &Node) {
    let Some(parent) = child.parent() else {
        return;
    };
    parent.0.children.borrow_mut().retain(|node| node != child);
    *child.0.parent.borrow_mut() = Weak::new();
    record_change(&parent, Vec::new(), vec![child.clone()]);
}

pub(crate) fn insert_at(parent: &Node, index: usize, child: &Node) {
    debug_assert!(child.parent().is_none(), "insert_at expects a detached node");
    {
        let mut children = parent.0.children.borrow_mut();
        let index = index.min(children.len());
        children.insert(index, child.clone());
    }
    *child.0.parent.borrow_mut() = Rc::downgrade(&parent.0);
    record_change(parent, vec![child.clone()], Vec::new());
}

pub(crate) fn clear_children(parent: &Node) -> Vec<Node> {
    let removed: Vec<Node> = parent.0.children.borrow_mut().drain(..).collect();
    for child in &removed {
        *child.0.parent.borrow_mut() = Weak::new();
    }
    if !removed.is_empty() {
        record_change(parent, Vec::new(), removed.clone());
    }
    removed
}

pub(crate) fn set_text_data(node: &Node, text: &str) {
    *node.0.text.borrow_mut() = text.to_owned();
}

pub(crate) fn ensure_insertable(parent: &Node, child: &Node) -> Result<(), DomError> {
    if parent.document_id() != child.document_id() {
        return Err(DomError::WrongDocument { node: child.id() });
    }
    let fits = !matches!(child.0.kind, NodeKind::Document)
        && !parent.is_text()
        && !child.contains(parent);
    if fits {
        Ok(())
    } else {
        Err(DomError::HierarchyRequest {
            parent: parent.id(),
            child: child.id(),
        })
    }
}

fn record_change(target: &Node, added: Vec<Node>, removed: Vec<Node>) {
    if let Some(document) = target.0.document.upgrade() {
        document.queue_record(target, added, removed);
    }
}

pub(crate) struct DocumentInner {
    id: DocumentId,
    this: Weak<DocumentInner>,
    root: Node,
    body: Node,
    tables: RefCell<PrototypeTables>,
    runtime: HostRuntime,
    observers: RefCell<Vec<ObserverState>>,
    next_observer_id: Cell<u64>,
}

/// Builder for documents with non-default platform shape.
pub struct DocumentBuilder {
    scheduler: Arc<dyn HostScheduler>,
    omitted: Vec<PrimitiveName>,
    shadowed: Vec<(Prototype, PrimitiveName)>,
}

impl DocumentBuilder {
    pub fn scheduler(mut self, scheduler: Arc<dyn HostScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Leaves a primitive out entirely, like a platform that never shipped it.
    pub fn without(mut self, name: PrimitiveName) -> Self {
        self.omitted.push(name);
        self
    }

    /// Gives `prototype` its own copy of `name` instead of inheriting it.
    pub fn shadow(mut self, prototype: Prototype, name: PrimitiveName) -> Self {
        self.shadowed.push((prototype, name));
        self
    }

    pub fn build(self) -> Document {
        let tables = PrototypeTables::standard(&self.omitted, &self.shadowed);
        let runtime = HostRuntime::new(self.scheduler);
        let inner = Rc::new_cyclic(|this: &Weak<DocumentInner>| {
            let root = Node::new(NodeKind::Document, String::new(), this.clone());
            let body = Node::new(
                NodeKind::Element {
                    tag: "body".into(),
                    namespace: Namespace::Html,
                },
                String::new(),
                this.clone(),
            );
            root.0.children.borrow_mut().push(body.clone());
            *body.0.parent.borrow_mut() = Rc::downgrade(&root.0);
            DocumentInner {
                id: DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed)),
                this: this.clone(),
                root,
                body,
                tables: RefCell::new(tables),
                runtime,
                observers: RefCell::new(Vec::new()),
                next_observer_id: Cell::new(1),
            }
        });
        Document { inner }
    }
}

#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

impl Document {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> DocumentBuilder {
        DocumentBuilder {
            scheduler: Arc::new(DefaultScheduler),
            omitted: Vec::new(),
            shadowed: Vec::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.inner.id
    }

    pub fn root(&self) -> Node {
        self.inner.root.clone()
    }

    pub fn body(&self) -> Node {
        self.inner.body.clone()
    }

    pub fn create_element(&self, tag: &str) -> Node {
        self.create(NodeKind::Element {
            tag: tag.to_owned(),
            namespace: Namespace::Html,
        })
    }

    pub fn create_svg_element(&self, tag: &str) -> Node {
        self.create(NodeKind::Element {
            tag: tag.to_owned(),
            namespace: Namespace::Svg,
        })
    }

    pub fn create_text(&self, text: &str) -> Node {
        Node::new(NodeKind::Text, text.to_owned(), Rc::downgrade(&self.inner))
    }

    fn create(&self, kind: NodeKind) -> Node {
        Node::new(kind, String::new(), Rc::downgrade(&self.inner))
    }

    pub fn runtime(&self) -> &HostRuntime {
        &self.inner.runtime
    }

    /// Runs queued tasks until none are left, the equivalent of reaching a
    /// microtask checkpoint.
    pub fn run_pending_tasks(&self) {
        while self.inner.runtime.has_pending_tasks() {
            self.inner.runtime.drain_tasks();
        }
    }

    /// Native primitives that bypass whatever is installed in the tables.
    pub fn raw(&self) -> RawMutations {
        RawMutations::new(self.clone())
    }

    /// The primitive `prototype` defines itself, ignoring inheritance.
    pub fn own_primitive(&self, prototype: Prototype, name: PrimitiveName) -> Option<Primitive> {
        self.inner.tables.borrow().own(prototype, name)
    }

    /// The primitive a node with this prototype would run.
    pub fn resolve(&self, prototype: Prototype, name: PrimitiveName) -> Option<Primitive> {
        self.inner.tables.borrow().resolve(prototype, name)
    }

    pub fn set_primitive(&self, prototype: Prototype, name: PrimitiveName, primitive: Primitive) {
        self.inner.tables.borrow_mut().set(prototype, name, primitive);
    }

    /// Subscribes to batched child-list change records for the whole tree.
    pub fn observe_changes(&self, callback: impl Fn(Vec<ChangeRecord>) + 'static) -> ObserverHandle {
        let id = self.inner.next_observer_id.get();
        self.inner.next_observer_id.set(id + 1);
        self.inner
            .observers
            .borrow_mut()
            .push(ObserverState::new(id, Rc::new(callback)));
        ObserverHandle::new(self.inner.this.clone(), id)
    }

    pub(crate) fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document").field("id", &self.inner.id).finish()
    }
}

impl DocumentInner {
    fn queue_record(&self, target: &Node, added: Vec<Node>, removed: Vec<Node>) {
        if !target.is_connected() {
            return;
        }
        let mut to_schedule = Vec::new();
        {
            let mut observers = self.observers.borrow_mut();
            if observers.is_empty() {
                return;
            }
            let record = ChangeRecord {
                target: target.clone(),
                added,
                removed,
            };
            for observer in observers.iter_mut() {
                if observer.push(record.clone()) {
                    to_schedule.push(observer.id());
                }
            }
        }
        for observer_id in to_schedule {
            let document = self.this.clone();
            self.runtime.spawn_task(move || {
                if let Some(document) = document.upgrade() {
                    document.deliver(observer_id);
                }
            });
        }
    }

    fn deliver(&self, observer_id: u64) {
        let batch = {
            let mut observers = self.observers.borrow_mut();
            let batch = observers
                .iter_mut()
                .find(|observer| observer.id() == observer_id)
                .map(|observer| observer.take_batch());
            batch
        };
        if let Some((callback, records)) = batch {
            if !records.is_empty() {
                callback(records);
            }
        }
    }

    fn disconnect(&self, observer_id: u64) {
        self.observers
            .borrow_mut()
            .retain(|observer| observer.id() != observer_id);
    }
}

#[cfg(test)]
#[path = "tests/dom_tests.rs"]
mod tests;
