//! Interception of every tree-mutating primitive.
//!
//! Installation replaces each primitive in the document's prototype tables
//! with a wrapper produced from the original by a pure transform. The wrapper
//! calls [`MutationHooks::before_insert`] for every node that may be about to
//! land in a tree, runs the original unchanged, then calls
//! [`MutationHooks::after_change`] for every node whose attachment may have
//! changed. A failed original skips the after hooks; every node that went
//! through the before hook is handed to [`MutationHooks::insert_failed`]
//! instead, and the error is returned as is.

use std::rc::{Rc, Weak};

use crate::collections::map::HashSet;
use crate::dom::{Arg, Document, DomError, Node, Primitive, PrimitiveName, Prototype};

/// Receiver of the two hook points around a native mutation.
pub trait MutationHooks {
    /// `node` may be about to be inserted under `parent`.
    fn before_insert(&self, node: &Node, parent: &Node);

    /// `node` may have been inserted or removed.
    fn after_change(&self, node: &Node);

    /// The mutation announced for `node` through
    /// [`before_insert`](Self::before_insert) failed and the tree is
    /// unchanged.
    fn insert_failed(&self, node: &Node);
}

/// Guard against wrapping a primitive twice. Scoped to the installation
/// that owns it.
#[derive(Default)]
pub struct PatchRegistry {
    patched: HashSet<usize>,
    installed: Vec<(Prototype, PrimitiveName)>,
    missing: Vec<PrimitiveName>,
}

impl PatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, primitive: &Primitive) -> bool {
        self.patched.contains(&primitive.identity())
    }

    /// Table slots that received a wrapper.
    pub fn installed(&self) -> &[(Prototype, PrimitiveName)] {
        &self.installed
    }

    /// Primitives no prototype provided.
    pub fn missing(&self) -> &[PrimitiveName] {
        &self.missing
    }
}

/// Wraps every known primitive of `document`. A primitive inherited by
/// several prototypes is wrapped once, on the first prototype that provides
/// it. Wrappers this registry produced are recognised and left alone, so
/// running this again with the same registry is harmless.
pub fn install(document: &Document, hooks: &Rc<dyn MutationHooks>, registry: &mut PatchRegistry) {
    let hooks = Rc::downgrade(hooks);
    for name in PrimitiveName::ALL {
        let mut found = false;
        for prototype in Prototype::ALL {
            let Some(original) = document.resolve(prototype, name) else {
                continue;
            };
            found = true;
            if registry.contains(&original) {
                continue;
            }
            let wrapped = wrap(name, original, hooks.clone());
            registry.patched.insert(wrapped.identity());
            registry.installed.push((prototype, name));
            document.set_primitive(prototype, name, wrapped);
        }
        if !found {
            log::warn!(
                "cannot intercept {}: no prototype provides it, lifecycle tracking skips this mutation path",
                name.as_str()
            );
            registry.missing.push(name);
        }
    }
}

/// Puts the originals back into every slot this registry wrapped.
pub fn uninstall(document: &Document, registry: &mut PatchRegistry) {
    for (prototype, name) in registry.installed.drain(..) {
        let Some(current) = document.own_primitive(prototype, name) else {
            continue;
        };
        if !registry.patched.contains(&current.identity()) {
            continue;
        }
        if let Some(original) = current.original() {
            document.set_primitive(prototype, name, original.clone());
        }
    }
    registry.patched.clear();
}

fn wrap(name: PrimitiveName, original: Primitive, hooks: Weak<dyn MutationHooks>) -> Primitive {
    let inner = original.clone();
    Primitive::wrapping(original, move |this, args| {
        let Some(hooks) = hooks.upgrade() else {
            return inner.call(this, args);
        };
        intercepted(name, &inner, hooks.as_ref(), this, args)
    })
}

fn node_args(args: &[Arg]) -> impl Iterator<Item = &Node> {
    args.iter().filter_map(Arg::as_node)
}

/// Runs the original. On failure, undoes the before hooks of `announced`.
fn call_original(
    original: &Primitive,
    hooks: &dyn MutationHooks,
    this: &Node,
    args: &[Arg],
    announced: &[&Node],
) -> Result<Option<Node>, DomError> {
    original.call(this, args).map_err(|err| {
        for node in announced {
            hooks.insert_failed(node);
        }
        err
    })
}

fn intercepted(
    name: PrimitiveName,
    original: &Primitive,
    hooks: &dyn MutationHooks,
    this: &Node,
    args: &[Arg],
) -> Result<Option<Node>, DomError> {
    match name {
        PrimitiveName::AppendChild | PrimitiveName::InsertBefore => {
            let child = args.first().and_then(Arg::as_node);
            if let Some(child) = child {
                hooks.before_insert(child, this);
            }
            let announced: Vec<&Node> = child.into_iter().collect();
            let result = call_original(original, hooks, this, args, &announced)?;
            if let Some(child) = child {
                hooks.after_change(child);
            }
            Ok(result)
        }
        PrimitiveName::Append | PrimitiveName::Prepend => {
            let announced: Vec<&Node> = node_args(args).collect();
            for node in &announced {
                hooks.before_insert(node, this);
            }
            let result = call_original(original, hooks, this, args, &announced)?;
            announced.iter().for_each(|node| hooks.after_change(node));
            Ok(result)
        }
        PrimitiveName::Before | PrimitiveName::After | PrimitiveName::ReplaceWith => {
            let nodes: Vec<&Node> = node_args(args).collect();
            let mut announced = Vec::new();
            if let Some(parent) = this.parent() {
                for node in &nodes {
                    hooks.before_insert(node, &parent);
                }
                announced.extend_from_slice(&nodes);
            }
            let result = call_original(original, hooks, this, args, &announced)?;
            if name == PrimitiveName::ReplaceWith {
                hooks.after_change(this);
            }
            nodes.iter().for_each(|node| hooks.after_change(node));
            Ok(result)
        }
        PrimitiveName::InsertAdjacentElement => {
            let element = args.get(1).and_then(Arg::as_node);
            let inside = matches!(
                args.first(),
                Some(Arg::Text(position))
                    if position.eq_ignore_ascii_case("afterbegin")
                        || position.eq_ignore_ascii_case("beforeend")
            );
            let parent = if inside { Some(this.clone()) } else { this.parent() };
            let mut announced = Vec::new();
            if let (Some(element), Some(parent)) = (element, parent) {
                hooks.before_insert(element, &parent);
                announced.push(element);
            }
            let result = call_original(original, hooks, this, args, &announced)?;
            if let Some(element) = element {
                hooks.after_change(element);
            }
            Ok(result)
        }
        PrimitiveName::RemoveChild => {
            let result = original.call(this, args)?;
            if let Some(child) = args.first().and_then(Arg::as_node) {
                hooks.after_change(child);
            }
            Ok(result)
        }
        PrimitiveName::Remove | PrimitiveName::SetOuterHtml => {
            let result = original.call(this, args)?;
            hooks.after_change(this);
            Ok(result)
        }
        PrimitiveName::ReplaceChild => {
            let new = args.first().and_then(Arg::as_node);
            if let Some(new) = new {
                hooks.before_insert(new, this);
            }
            let announced: Vec<&Node> = new.into_iter().collect();
            let result = call_original(original, hooks, this, args, &announced)?;
            if let Some(old) = args.get(1).and_then(Arg::as_node) {
                hooks.after_change(old);
            }
            if let Some(new) = new {
                hooks.after_change(new);
            }
            Ok(result)
        }
        PrimitiveName::ReplaceChildren => {
            let old_children = this.children();
            let announced: Vec<&Node> = node_args(args).collect();
            for node in &announced {
                hooks.before_insert(node, this);
            }
            let result = call_original(original, hooks, this, args, &announced)?;
            old_children.iter().for_each(|node| hooks.after_change(node));
            announced.iter().for_each(|node| hooks.after_change(node));
            Ok(result)
        }
        // Nodes created from markup have no ledger yet, so only the old
        // children need a look.
        PrimitiveName::SetInnerHtml | PrimitiveName::SetHtml | PrimitiveName::SetTextContent => {
            let old_children = this.children();
            let result = original.call(this, args)?;
            old_children.iter().for_each(|node| hooks.after_change(node));
            Ok(result)
        }
    }
}

#[cfg(test)]
#[path = "tests/intercept_tests.rs"]
mod tests;
