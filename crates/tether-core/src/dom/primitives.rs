use std::fmt;
use std::rc::Rc;

use super::{
    clear_children, detach, ensure_insertable, insert_at, set_text_data, Document, DomError, Node,
};
use crate::collections::map::HashMap;

/// Every tree-mutating entry point the host exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveName {
    AppendChild,
    InsertBefore,
    Append,
    Prepend,
    Before,
    After,
    InsertAdjacentElement,
    RemoveChild,
    Remove,
    ReplaceChild,
    ReplaceChildren,
    ReplaceWith,
    SetInnerHtml,
    SetOuterHtml,
    SetHtml,
    SetTextContent,
}

impl PrimitiveName {
    pub const ALL: [PrimitiveName; 16] = [
        PrimitiveName::AppendChild,
        PrimitiveName::InsertBefore,
        PrimitiveName::Append,
        PrimitiveName::Prepend,
        PrimitiveName::Before,
        PrimitiveName::After,
        PrimitiveName::InsertAdjacentElement,
        PrimitiveName::RemoveChild,
        PrimitiveName::Remove,
        PrimitiveName::ReplaceChild,
        PrimitiveName::ReplaceChildren,
        PrimitiveName::ReplaceWith,
        PrimitiveName::SetInnerHtml,
        PrimitiveName::SetOuterHtml,
        PrimitiveName::SetHtml,
        PrimitiveName::SetTextContent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveName::AppendChild => "appendChild",
            PrimitiveName::InsertBefore => "insertBefore",
            PrimitiveName::Append => "append",
            PrimitiveName::Prepend => "prepend",
            PrimitiveName::Before => "before",
            PrimitiveName::After => "after",
            PrimitiveName::InsertAdjacentElement => "insertAdjacentElement",
            PrimitiveName::RemoveChild => "removeChild",
            PrimitiveName::Remove => "remove",
            PrimitiveName::ReplaceChild => "replaceChild",
            PrimitiveName::ReplaceChildren => "replaceChildren",
            PrimitiveName::ReplaceWith => "replaceWith",
            PrimitiveName::SetInnerHtml => "innerHTML",
            PrimitiveName::SetOuterHtml => "outerHTML",
            PrimitiveName::SetHtml => "setHTML",
            PrimitiveName::SetTextContent => "textContent",
        }
    }

    /// Prototype the standard platform defines this primitive on. Child-node
    /// operations live on both `Element` and `CharacterData`.
    fn standard_owners(self) -> &'static [Prototype] {
        match self {
            PrimitiveName::AppendChild
            | PrimitiveName::InsertBefore
            | PrimitiveName::RemoveChild
            | PrimitiveName::ReplaceChild
            | PrimitiveName::SetTextContent => &[Prototype::Node],
            PrimitiveName::Before
            | PrimitiveName::After
            | PrimitiveName::Remove
            | PrimitiveName::ReplaceWith => &[Prototype::Element, Prototype::CharacterData],
            PrimitiveName::Append
            | PrimitiveName::Prepend
            | PrimitiveName::ReplaceChildren
            | PrimitiveName::InsertAdjacentElement
            | PrimitiveName::SetInnerHtml
            | PrimitiveName::SetOuterHtml
            | PrimitiveName::SetHtml => &[Prototype::Element],
        }
    }

    fn native(self) -> fn(&Node, &[Arg]) -> Result<Option<Node>, DomError> {
        match self {
            PrimitiveName::AppendChild => native_append_child,
            PrimitiveName::InsertBefore => native_insert_before,
            PrimitiveName::Append => native_append,
            PrimitiveName::Prepend => native_prepend,
            PrimitiveName::Before => native_before,
            PrimitiveName::After => native_after,
            PrimitiveName::InsertAdjacentElement => native_insert_adjacent_element,
            PrimitiveName::RemoveChild => native_remove_child,
            PrimitiveName::Remove => native_remove,
            PrimitiveName::ReplaceChild => native_replace_child,
            PrimitiveName::ReplaceChildren => native_replace_children,
            PrimitiveName::ReplaceWith => native_replace_with,
            PrimitiveName::SetInnerHtml | PrimitiveName::SetHtml => native_set_inner_markup,
            PrimitiveName::SetOuterHtml => native_set_outer_html,
            PrimitiveName::SetTextContent => native_set_text_content,
        }
    }
}

impl fmt::Display for PrimitiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared-behaviour tables, resolved through a fixed inheritance chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Prototype {
    Node,
    CharacterData,
    Element,
    HtmlElement,
    SvgElement,
}

impl Prototype {
    pub const ALL: [Prototype; 5] = [
        Prototype::Node,
        Prototype::CharacterData,
        Prototype::Element,
        Prototype::HtmlElement,
        Prototype::SvgElement,
    ];

    /// Lookup order, most derived first.
    pub fn chain(self) -> &'static [Prototype] {
        match self {
            Prototype::Node => &[Prototype::Node],
            Prototype::CharacterData => &[Prototype::CharacterData, Prototype::Node],
            Prototype::Element => &[Prototype::Element, Prototype::Node],
            Prototype::HtmlElement => &[Prototype::HtmlElement, Prototype::Element, Prototype::Node],
            Prototype::SvgElement => &[Prototype::SvgElement, Prototype::Element, Prototype::Node],
        }
    }
}

/// Argument of a primitive call. Plain text is never a tree node until the
/// primitive materialises it.
#[derive(Debug, Clone)]
pub enum Arg {
    Node(Node),
    Text(String),
}

impl Arg {
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Arg::Node(node) => Some(node),
            Arg::Text(_) => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Text(text) => Some(text),
            Arg::Node(_) => None,
        }
    }
}

impl From<&Node> for Arg {
    fn from(node: &Node) -> Self {
        Arg::Node(node.clone())
    }
}

impl From<Node> for Arg {
    fn from(node: Node) -> Self {
        Arg::Node(node)
    }
}

impl From<&str> for Arg {
    fn from(text: &str) -> Self {
        Arg::Text(text.to_owned())
    }
}

impl From<String> for Arg {
    fn from(text: String) -> Self {
        Arg::Text(text)
    }
}

pub type PrimitiveFn = dyn Fn(&Node, &[Arg]) -> Result<Option<Node>, DomError>;

struct PrimitiveInner {
    call: Box<PrimitiveFn>,
    wraps: Option<Primitive>,
}

/// One entry of a prototype table. Identity is pointer identity.
#[derive(Clone)]
pub struct Primitive {
    inner: Rc<PrimitiveInner>,
}

impl Primitive {
    pub fn native(name: PrimitiveName) -> Self {
        let native = name.native();
        Self::new(move |this, args| native(this, args))
    }

    pub fn new(call: impl Fn(&Node, &[Arg]) -> Result<Option<Node>, DomError> + 'static) -> Self {
        Self {
            inner: Rc::new(PrimitiveInner {
                call: Box::new(call),
                wraps: None,
            }),
        }
    }

    /// A replacement that remembers the primitive it stands in for.
    pub fn wrapping(
        original: Primitive,
        call: impl Fn(&Node, &[Arg]) -> Result<Option<Node>, DomError> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(PrimitiveInner {
                call: Box::new(call),
                wraps: Some(original),
            }),
        }
    }

    pub fn call(&self, this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
        (self.inner.call)(this, args)
    }

    pub fn is_wrapper(&self) -> bool {
        self.inner.wraps.is_some()
    }

    pub fn original(&self) -> Option<&Primitive> {
        self.inner.wraps.as_ref()
    }

    pub fn ptr_eq(&self, other: &Primitive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("identity", &self.identity())
            .field("is_wrapper", &self.is_wrapper())
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct PrototypeTables {
    tables: HashMap<Prototype, HashMap<PrimitiveName, Primitive>>,
}

impl PrototypeTables {
    pub(crate) fn standard(omitted: &[PrimitiveName], shadowed: &[(Prototype, PrimitiveName)]) -> Self {
        let mut tables = PrototypeTables::default();
        for name in PrimitiveName::ALL {
            if omitted.contains(&name) {
                continue;
            }
            let primitive = Primitive::native(name);
            for owner in name.standard_owners() {
                tables.set(*owner, name, primitive.clone());
            }
        }
        for (prototype, name) in shadowed {
            if !omitted.contains(name) {
                tables.set(*prototype, *name, Primitive::native(*name));
            }
        }
        tables
    }

    pub(crate) fn own(&self, prototype: Prototype, name: PrimitiveName) -> Option<Primitive> {
        self.tables.get(&prototype)?.get(&name).cloned()
    }

    pub(crate) fn resolve(&self, prototype: Prototype, name: PrimitiveName) -> Option<Primitive> {
        prototype
            .chain()
            .iter()
            .find_map(|link| self.own(*link, name))
    }

    pub(crate) fn set(&mut self, prototype: Prototype, name: PrimitiveName, primitive: Primitive) {
        self.tables
            .entry(prototype)
            .or_default()
            .insert(name, primitive);
    }
}

/// Direct access to the native primitives, bypassing the tables. This is the
/// path third-party code takes when it holds on to the original functions.
pub struct RawMutations {
    document: Document,
}

impl RawMutations {
    pub(crate) fn new(document: Document) -> Self {
        Self { document }
    }

    pub fn call(&self, target: &Node, name: PrimitiveName, args: &[Arg]) -> Result<Option<Node>, DomError> {
        if target.document_id() != Some(self.document.id()) {
            return Err(DomError::WrongDocument { node: target.id() });
        }
        (name.native())(target, args)
    }

    pub fn append_child(&self, parent: &Node, child: &Node) -> Result<Option<Node>, DomError> {
        self.call(parent, PrimitiveName::AppendChild, &[Arg::from(child)])
    }

    pub fn remove(&self, node: &Node) -> Result<Option<Node>, DomError> {
        self.call(node, PrimitiveName::Remove, &[])
    }
}

fn node_arg(args: &[Arg], index: usize, name: PrimitiveName) -> Result<&Node, DomError> {
    args.get(index)
        .and_then(Arg::as_node)
        .ok_or(DomError::InvalidArgument { name, index })
}

fn text_arg(args: &[Arg], index: usize, name: PrimitiveName) -> Result<&str, DomError> {
    args.get(index)
        .and_then(Arg::as_text)
        .ok_or(DomError::InvalidArgument { name, index })
}

fn owner_document(node: &Node) -> Result<Document, DomError> {
    node.document().ok_or(DomError::Detached { node: node.id() })
}

/// Turns text arguments into fresh text nodes and checks every node fits
/// under `parent` before anything moves.
fn materialize(parent: &Node, args: &[Arg]) -> Result<Vec<Node>, DomError> {
    let document = owner_document(parent)?;
    let nodes: Vec<Node> = args
        .iter()
        .map(|arg| match arg {
            Arg::Node(node) => node.clone(),
            Arg::Text(text) => document.create_text(text),
        })
        .collect();
    for node in &nodes {
        ensure_insertable(parent, node)?;
    }
    Ok(nodes)
}

fn insert_all(parent: &Node, mut index: usize, nodes: &[Node]) {
    for node in nodes {
        detach(node);
        insert_at(parent, index, node);
        index += 1;
    }
}

fn native_append_child(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let child = node_arg(args, 0, PrimitiveName::AppendChild)?;
    ensure_insertable(this, child)?;
    detach(child);
    insert_at(this, this.child_count(), child);
    Ok(Some(child.clone()))
}

fn native_insert_before(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let child = node_arg(args, 0, PrimitiveName::InsertBefore)?;
    let reference = args.get(1).and_then(Arg::as_node);
    ensure_insertable(this, child)?;
    if let Some(reference) = reference {
        if reference.parent().as_ref() != Some(this) {
            return Err(DomError::NotFound {
                parent: this.id(),
                child: reference.id(),
            });
        }
        if reference == child {
            return Ok(Some(child.clone()));
        }
    }
    detach(child);
    let index = match reference {
        Some(reference) => reference.index_in_parent().unwrap_or(this.child_count()),
        None => this.child_count(),
    };
    insert_at(this, index, child);
    Ok(Some(child.clone()))
}

fn native_append(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let nodes = materialize(this, args)?;
    for node in &nodes {
        detach(node);
        insert_at(this, this.child_count(), node);
    }
    Ok(None)
}

fn native_prepend(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let nodes = materialize(this, args)?;
    for node in &nodes {
        detach(node);
    }
    insert_all(this, 0, &nodes);
    Ok(None)
}

/// First sibling of `this` on the given side that is not one of `nodes`.
fn viable_sibling(parent: &Node, this: &Node, nodes: &[Node], following: bool) -> Option<Node> {
    let siblings = parent.children();
    let position = this.index_in_parent()?;
    let viable = |sibling: &&Node| !nodes.contains(sibling);
    let found = if following {
        siblings.get(position + 1..)?.iter().find(viable).cloned()
    } else {
        siblings[..position].iter().rev().find(viable).cloned()
    };
    found
}

// `this` may be among the inserted nodes; the insertion point is the nearest
// sibling that stays put.
fn insert_beside(this: &Node, args: &[Arg], after: bool) -> Result<Option<Node>, DomError> {
    let Some(parent) = this.parent() else {
        return Ok(None);
    };
    let nodes = materialize(&parent, args)?;
    let anchor = viable_sibling(&parent, this, &nodes, after);
    for node in &nodes {
        detach(node);
    }
    let index = match (after, anchor) {
        (true, Some(next)) => next.index_in_parent().unwrap_or(parent.child_count()),
        (true, None) => parent.child_count(),
        (false, Some(previous)) => previous.index_in_parent().map_or(0, |index| index + 1),
        (false, None) => 0,
    };
    insert_all(&parent, index, &nodes);
    Ok(None)
}

fn native_before(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    insert_beside(this, args, false)
}

fn native_after(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    insert_beside(this, args, true)
}

fn native_insert_adjacent_element(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let name = PrimitiveName::InsertAdjacentElement;
    let position = text_arg(args, 0, name)?.to_ascii_lowercase();
    let element = node_arg(args, 1, name)?;
    let args = [Arg::from(element)];
    match position.as_str() {
        "beforebegin" => {
            if this.parent().is_none() {
                return Ok(None);
            }
            native_before(this, &args)?;
        }
        "afterend" => {
            if this.parent().is_none() {
                return Ok(None);
            }
            native_after(this, &args)?;
        }
        "afterbegin" => {
            native_prepend(this, &args)?;
        }
        "beforeend" => {
            native_append_child(this, &args)?;
        }
        _ => return Err(DomError::InvalidPosition(position)),
    }
    Ok(Some(element.clone()))
}

fn native_remove_child(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let child = node_arg(args, 0, PrimitiveName::RemoveChild)?;
    if child.parent().as_ref() != Some(this) {
        return Err(DomError::NotFound {
            parent: this.id(),
            child: child.id(),
        });
    }
    detach(child);
    Ok(Some(child.clone()))
}

fn native_remove(this: &Node, _args: &[Arg]) -> Result<Option<Node>, DomError> {
    detach(this);
    Ok(None)
}

fn native_replace_child(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let name = PrimitiveName::ReplaceChild;
    let new = node_arg(args, 0, name)?;
    let old = node_arg(args, 1, name)?;
    if old.parent().as_ref() != Some(this) {
        return Err(DomError::NotFound {
            parent: this.id(),
            child: old.id(),
        });
    }
    ensure_insertable(this, new)?;
    if new == old {
        return Ok(Some(old.clone()));
    }
    detach(new);
    let index = old.index_in_parent().unwrap_or(this.child_count());
    detach(old);
    insert_at(this, index, new);
    Ok(Some(old.clone()))
}

fn native_replace_children(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let nodes = materialize(this, args)?;
    for node in &nodes {
        detach(node);
    }
    clear_children(this);
    insert_all(this, 0, &nodes);
    Ok(None)
}

fn native_replace_with(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let Some(parent) = this.parent() else {
        return Ok(None);
    };
    let nodes = materialize(&parent, args)?;
    let next = viable_sibling(&parent, this, &nodes, true);
    for node in &nodes {
        detach(node);
    }
    // `this` is still in place unless it was one of the replacements.
    let index = match this.index_in_parent() {
        Some(index) => {
            detach(this);
            index
        }
        None => next
            .and_then(|next| next.index_in_parent())
            .unwrap_or(parent.child_count()),
    };
    insert_all(&parent, index, &nodes);
    Ok(None)
}

// Markup is not parsed: it becomes a single text node carrying it verbatim.
fn native_set_inner_markup(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let markup = text_arg(args, 0, PrimitiveName::SetInnerHtml)?;
    let document = owner_document(this)?;
    clear_children(this);
    if !markup.is_empty() {
        insert_at(this, 0, &document.create_text(markup));
    }
    Ok(None)
}

fn native_set_outer_html(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let markup = text_arg(args, 0, PrimitiveName::SetOuterHtml)?;
    let Some(parent) = this.parent() else {
        return Ok(None);
    };
    let document = owner_document(this)?;
    let index = this.index_in_parent().unwrap_or(parent.child_count());
    detach(this);
    if !markup.is_empty() {
        insert_at(&parent, index, &document.create_text(markup));
    }
    Ok(None)
}

fn native_set_text_content(this: &Node, args: &[Arg]) -> Result<Option<Node>, DomError> {
    let text = text_arg(args, 0, PrimitiveName::SetTextContent)?;
    if this.is_text() {
        set_text_data(this, text);
        return Ok(None);
    }
    let document = owner_document(this)?;
    clear_children(this);
    if !text.is_empty() {
        insert_at(this, 0, &document.create_text(text));
    }
    Ok(None)
}
