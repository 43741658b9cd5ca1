// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::errors::GraphError;
use crate::graph::{Capabilities, Element, NodeId, TopicSet};
use crate::stream::Stream;

/// Weak back-reference from a child to the node holding it.
#[derive(Default)]
pub(crate) struct Membership(RefCell<Weak<NodeInner>>);

impl Membership {
    pub(crate) fn get(&self) -> Option<Node> {
        self.0.borrow().upgrade().map(|inner| Node { inner })
    }

    pub(crate) fn set(&self, parent: Option<&Node>) {
        *self.0.borrow_mut() = parent.map(|p| Rc::downgrade(&p.inner)).unwrap_or_default();
    }
}

type AdaptHook = Rc<dyn Fn()>;

pub(crate) struct NodeInner {
    id: NodeId,
    inflow: Stream,
    outflow: Stream,
    parent: Membership,
    children: RefCell<Vec<Element>>,
    consumes: RefCell<Option<TopicSet>>,
    produces: RefCell<Option<TopicSet>>,
    hooks: RefCell<Vec<AdaptHook>>,
    enabled: Cell<bool>,
}

/// Base composable element.
///
/// A node owns an inflow and an outflow stream. Adding a child pipes
/// `inflow → child.input` and `child.output → outflow`; removing it undoes both
/// pipes. `consumes`/`produces` are unions over the children, recomputed lazily
/// after every membership change.
#[derive(Clone)]
pub struct Node {
    inner: Rc<NodeInner>,
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    /// Node with fresh pass-through inflow and outflow streams.
    pub fn new() -> Self {
        Self::with_flows(NodeId::generate(), Stream::new(), Stream::new())
    }

    /// Node over existing streams. `inflow` and `outflow` may be the same stream.
    pub fn with_flows(id: NodeId, inflow: Stream, outflow: Stream) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                id,
                inflow,
                outflow,
                parent: Membership::default(),
                children: RefCell::new(Vec::new()),
                consumes: RefCell::new(None),
                produces: RefCell::new(None),
                hooks: RefCell::new(Vec::new()),
                enabled: Cell::new(true),
            }),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.inner.id
    }

    pub fn inflow(&self) -> &Stream {
        &self.inner.inflow
    }

    pub fn outflow(&self) -> &Stream {
        &self.inner.outflow
    }

    pub fn parent(&self) -> Option<Node> {
        self.inner.parent.get()
    }

    pub(crate) fn membership(&self) -> &Membership {
        &self.inner.parent
    }

    /// Children in attach order.
    pub fn children(&self) -> Vec<Element> {
        self.inner.children.borrow().clone()
    }

    pub fn contains(&self, child: &Element) -> bool {
        self.inner.children.borrow().iter().any(|c| c.same(child))
    }

    /// Attach `child`.
    ///
    /// Returns `Ok(false)` if it is already a member. A child held by another
    /// node is detached from it first. Fails without mutating anything if the
    /// child is this node or one of its ancestors.
    pub fn add(&self, child: &Element) -> Result<bool, GraphError> {
        if let Some(node) = child.node() {
            if self.descends_from(&node) {
                return Err(GraphError::CyclicMembership {
                    child: child.id().clone(),
                    parent: self.id().clone(),
                });
            }
        }
        if self.contains(child) {
            return Ok(false);
        }
        if let Some(previous) = child.parent() {
            previous.remove(child);
        }

        tracing::debug!(node = %self.inner.id, child = %child.id(), kind = child.kind(), "add");
        self.inner.children.borrow_mut().push(child.clone());
        child.set_parent(Some(self));
        self.connect(child);
        self.adapt();
        Ok(true)
    }

    /// Detach `child`, discarding anything buffered at its boundary.
    pub fn remove(&self, child: &Element) -> bool {
        let position = self
            .inner
            .children
            .borrow()
            .iter()
            .position(|c| c.same(child));
        let Some(position) = position else {
            return false;
        };

        tracing::debug!(node = %self.inner.id, child = %child.id(), kind = child.kind(), "remove");
        self.inner.children.borrow_mut().remove(position);
        child.set_parent(None);
        self.disconnect(child);
        self.adapt();
        true
    }

    fn connect(&self, child: &Element) {
        if let Some(input) = child.input() {
            self.inner.inflow.pipe(&input);
        }
        if let Some(output) = child.output() {
            output.pipe(&self.inner.outflow);
        }
    }

    fn disconnect(&self, child: &Element) {
        if let Some(output) = child.output() {
            output.unpipe(&self.inner.outflow);
            output.discard();
        }
        if let Some(input) = child.input() {
            self.inner.inflow.unpipe(&input);
            input.discard();
        }
    }

    /// Join `parent` as a child of it.
    pub fn join(&self, parent: &Element) -> Result<(), GraphError> {
        Element::Node(self.clone()).join(parent)
    }

    /// Leave the current parent, if any.
    pub fn leave(&self) -> bool {
        Element::Node(self.clone()).leave()
    }

    /// True if `ancestor` is this node or any of its parents.
    pub(crate) fn descends_from(&self, ancestor: &Node) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.same(ancestor) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Union of the children's input topics.
    pub fn consumes(&self) -> TopicSet {
        if let Some(cached) = self.inner.consumes.borrow().as_ref() {
            return cached.clone();
        }
        let consumes: TopicSet = self
            .children()
            .iter()
            .flat_map(|c| c.describe().inputs())
            .collect();
        *self.inner.consumes.borrow_mut() = Some(consumes.clone());
        consumes
    }

    /// Union of the children's produced topics.
    pub fn produces(&self) -> TopicSet {
        if let Some(cached) = self.inner.produces.borrow().as_ref() {
            return cached.clone();
        }
        let produces: TopicSet = self
            .children()
            .iter()
            .flat_map(|c| c.describe().produces)
            .collect();
        *self.inner.produces.borrow_mut() = Some(produces.clone());
        produces
    }

    pub fn describe(&self) -> Capabilities {
        Capabilities {
            requires: TopicSet::new(),
            consumes: self.consumes(),
            produces: self.produces(),
        }
    }

    /// Register a hook run on every invalidation of this node.
    pub fn on_adapt<F>(&self, hook: F)
    where
        F: Fn() + 'static,
    {
        self.inner.hooks.borrow_mut().push(Rc::new(hook));
    }

    /// Invalidate cached capability sets, run the hooks once, then signal the parent.
    pub fn adapt(&self) {
        self.inner.consumes.borrow_mut().take();
        self.inner.produces.borrow_mut().take();

        let hooks: Vec<AdaptHook> = self.inner.hooks.borrow().iter().cloned().collect();
        for hook in hooks {
            hook();
        }

        if let Some(parent) = self.parent() {
            parent.adapt();
        }
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.set(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    /// Enabled, and every ancestor is enabled too.
    pub fn is_active(&self) -> bool {
        self.is_enabled() && self.parent().map_or(true, |p| p.is_active())
    }

    pub fn same(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::Pulse;
    use crate::reaction::{Reaction, ReactionDescriptor};
    use crate::router::Router;
    use serde_json::json;
    use std::cell::Cell;

    fn reaction(label: &str, requires: &[&str], consumes: &[&str], produces: &[&str]) -> Element {
        Element::Reaction(
            Reaction::new(
                ReactionDescriptor::new(label)
                    .requires(requires.iter().copied())
                    .consumes(consumes.iter().copied())
                    .produces(produces.iter().copied()),
            )
            .unwrap(),
        )
    }

    fn topics(names: &[&str]) -> TopicSet {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_add_wires_child_between_inflow_and_outflow() {
        let node = Node::new();
        let child = Stream::with_filter(|p| p.topic() == "keep");
        assert!(node.add(&Element::Stream(child.clone())).unwrap());

        node.inflow().feed("keep", [json!(1)]);
        node.inflow().feed("drop", [json!(2)]);

        let out = node.outflow().read_pulses();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].topic(), "keep");
    }

    #[test]
    fn test_add_twice_is_noop() {
        let node = Node::new();
        let child = Element::Stream(Stream::new());

        assert!(node.add(&child).unwrap());
        assert!(!node.add(&child).unwrap());
        assert_eq!(node.children().len(), 1);
    }

    #[test]
    fn test_remove_unwires_child() {
        let node = Node::new();
        let stream = Stream::new();
        let child = Element::Stream(stream.clone());
        node.add(&child).unwrap();

        assert!(node.remove(&child));
        assert!(!node.remove(&child));

        node.inflow().write(Pulse::new("after"));
        assert_eq!(stream.buffered(), 0);
        assert_eq!(node.outflow().buffered(), 0);
        assert!(child.parent().is_none());
    }

    #[test]
    fn test_child_moves_between_parents() {
        let first = Node::new();
        let second = Node::new();
        let child = Node::new();

        child.join(&Element::Node(first.clone())).unwrap();
        child.join(&Element::Node(second.clone())).unwrap();

        assert!(first.children().is_empty());
        assert_eq!(second.children().len(), 1);
        assert!(child.parent().unwrap().same(&second));
    }

    #[test]
    fn test_join_stream_is_not_composable() {
        let child = Node::new();
        let err = child.join(&Element::Stream(Stream::new())).unwrap_err();

        assert!(matches!(err, GraphError::NotComposable { kind: "stream", .. }));
        assert!(child.parent().is_none());
    }

    #[test]
    fn test_cyclic_membership_rejected() {
        let outer = Node::new();
        let inner = Node::new();
        inner.join(&Element::Node(outer.clone())).unwrap();

        let err = outer.join(&Element::Node(inner.clone())).unwrap_err();
        assert!(matches!(err, GraphError::CyclicMembership { .. }));
        assert!(outer.parent().is_none());
    }

    #[test]
    fn test_leave_clears_parent() {
        let parent = Node::new();
        let child = Node::new();
        child.join(&Element::Node(parent.clone())).unwrap();

        assert!(child.leave());
        assert!(child.parent().is_none());
        assert!(parent.children().is_empty());
        assert!(!child.leave());
    }

    #[test]
    fn test_adapt_runs_hooks_once_and_propagates() {
        let parent = Node::new();
        let child = Node::new();
        child.join(&Element::Node(parent.clone())).unwrap();

        let parent_hits = Rc::new(Cell::new(0));
        let child_hits = Rc::new(Cell::new(0));
        let p = Rc::clone(&parent_hits);
        parent.on_adapt(move || p.set(p.get() + 1));
        let c = Rc::clone(&child_hits);
        child.on_adapt(move || c.set(c.get() + 1));

        child.add(&Element::Stream(Stream::new())).unwrap();

        assert_eq!(child_hits.get(), 1);
        assert_eq!(parent_hits.get(), 1);
    }

    #[test]
    fn test_capabilities_are_union_over_reaction_children() {
        let node = Node::new();
        node.add(&reaction("a", &["module/net"], &["link/connect"], &["link/socket"])).unwrap();
        node.add(&reaction("b", &[], &["link/socket"], &["link/ready"])).unwrap();
        node.add(&Element::Stream(Stream::new())).unwrap();

        assert_eq!(node.consumes(), topics(&["link/connect", "link/socket", "module/net"]));
        assert_eq!(node.produces(), topics(&["link/ready", "link/socket"]));
        assert!(node.describe().requires.is_empty());
    }

    #[test]
    fn test_capabilities_are_cached_until_membership_changes() {
        let node = Node::new();
        let first = reaction("a", &[], &["x"], &["y"]);
        node.add(&first).unwrap();
        assert!(node.inner.consumes.borrow().is_none());

        assert_eq!(node.consumes(), topics(&["x"]));
        assert_eq!(node.produces(), topics(&["y"]));
        assert!(node.inner.consumes.borrow().is_some());
        assert!(node.inner.produces.borrow().is_some());

        node.add(&reaction("b", &[], &["z"], &[])).unwrap();
        assert!(node.inner.consumes.borrow().is_none());
        assert!(node.inner.produces.borrow().is_none());
        assert_eq!(node.consumes(), topics(&["x", "z"]));

        assert!(node.remove(&first));
        assert_eq!(node.consumes(), topics(&["z"]));
        assert!(node.produces().is_empty());
    }

    #[test]
    fn test_router_child_adapt_invalidates_parent_capabilities() {
        let node = Node::new();
        let router = Router::new("nested").unwrap();
        router.add(ReactionDescriptor::new("a").consumes(["x"]).produces(["y"])).unwrap();
        node.add(&Element::Router(router.clone())).unwrap();

        assert_eq!(node.consumes(), topics(&["x"]));
        assert_eq!(node.produces(), topics(&["y"]));

        let reaction = router.add(ReactionDescriptor::new("b").consumes(["y"]).produces(["z"])).unwrap();
        assert!(node.inner.produces.borrow().is_none());
        assert_eq!(node.consumes(), topics(&["x", "y"]));
        assert_eq!(node.produces(), topics(&["y", "z"]));

        router.remove_reaction(reaction.id());
        assert_eq!(node.produces(), topics(&["y"]));
    }

    #[test]
    fn test_is_active_follows_ancestors() {
        let parent = Node::new();
        let child = Node::new();
        child.join(&Element::Node(parent.clone())).unwrap();

        assert!(child.is_active());
        parent.set_enabled(false);
        assert!(child.is_enabled());
        assert!(!child.is_active());
    }
}
