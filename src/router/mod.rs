// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Hierarchical router.
//!
//! A [`Router`] owns two streams. The *boundary* carries the router's own id,
//! so every pulse entering from outside (a parent router, an io adapter, a
//! direct `feed`) is marked by it on the way in. The *core* is where reactions
//! and nested routers are attached; its filter is the routing algorithm:
//!
//! * A pulse carrying the router's mark came from outside. It is gated against
//!   `inputs ∪ requires`; log pulses always pass. Rejected pulses stop here.
//! * A pulse without the mark was produced by one of the router's own children.
//!   Topics absorbed by a nested router and unrecognized byproducts are marked
//!   so that the boundary will not let them out; declared outputs leave
//!   unmarked. A passive router lets byproducts through for an ancestor to decide.
//!
//! Every pulse that passes is handed to every reaction. Nested routers are
//! linked to the core through their own boundary and see it through the pipe.
//!
//! Enabling links boundary and core; disabling unlinks them, leaving the
//! subtree wired but cut off.

mod cache;
mod observers;
mod state;


pub use cache::RouterCache;
pub use observers::{FlowTag, Observation, ObservationKind, Observer, Observers, SubscriptionId};
pub use state::{changed_keys, deep_merge};

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::{json, Map, Value};

use crate::config::consts::{DEFAULT_HIGH_WATER_MARK, DEFAULT_MAX_FLOWS};
use crate::errors::GraphError;
use crate::graph::{Capabilities, Element, Node, NodeId, TopicSet};
use crate::observability::messages::router::{
    CacheInvalidated, ChildAttached, ChildDetached, PulseDropped, RouterToggled, StateSaved,
};
use crate::observability::messages::StructuredLog;
use crate::pulse::{Pulse, Visit};
use crate::reaction::{Reaction, ReactionDescriptor, SharedState};
use crate::stream::{IoAdapter, PulseCodec, Stream, StreamOptions};

/// Declarative description of a router subtree.
#[derive(Debug, Clone)]
pub struct RouterDescriptor {
    pub id: Option<NodeId>,
    pub label: String,
    pub purpose: Option<String>,
    pub passive: bool,
    pub enabled: bool,
    pub high_water_mark: usize,
    pub max_flows: usize,
    /// Seed for the router's persisted state.
    pub state: Map<String, Value>,
    pub reactions: Vec<ReactionDescriptor>,
    pub routers: Vec<RouterDescriptor>,
}

impl RouterDescriptor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
            purpose: None,
            passive: false,
            enabled: true,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            max_flows: DEFAULT_MAX_FLOWS,
            state: Map::new(),
            reactions: Vec::new(),
            routers: Vec::new(),
        }
    }

    pub fn id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn passive(mut self, passive: bool) -> Self {
        self.passive = passive;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    pub fn max_flows(mut self, max_flows: usize) -> Self {
        self.max_flows = max_flows;
        self
    }

    pub fn state(mut self, state: Map<String, Value>) -> Self {
        self.state = state;
        self
    }

    pub fn reaction(mut self, reaction: ReactionDescriptor) -> Self {
        self.reactions.push(reaction);
        self
    }

    pub fn router(mut self, router: RouterDescriptor) -> Self {
        self.routers.push(router);
        self
    }
}

#[derive(Debug, Clone, Default)]
struct Props {
    enabled: bool,
    passive: bool,
    purpose: Option<String>,
}

struct RouterInner {
    id: NodeId,
    label: String,
    node: Node,
    core: Stream,
    boundary: Stream,
    props: RefCell<Props>,
    state: SharedState,
    cache: RefCell<Option<Rc<RouterCache>>>,
    observers: Observers,
    linked: RefCell<Vec<Stream>>,
}

/// Composite orchestrator. Cloning shares the same router.
#[derive(Clone)]
pub struct Router {
    inner: Rc<RouterInner>,
}

impl Router {
    /// Empty, enabled router.
    pub fn new(label: impl Into<String>) -> Result<Self, GraphError> {
        Self::build(&RouterDescriptor::new(label))
    }

    /// Build a detached router and its whole subtree.
    ///
    /// Every descriptor in the tree is resolved before anything is returned,
    /// so a failure leaves no partially built topology reachable.
    pub fn from_descriptor(descriptor: &RouterDescriptor) -> Result<Self, GraphError> {
        let router = Self::build(descriptor)?;
        router.set_passive(descriptor.passive);
        if let Some(purpose) = &descriptor.purpose {
            router.describe(purpose.clone());
        }
        if !descriptor.state.is_empty() {
            router.save(&descriptor.state, false);
        }
        for nested in &descriptor.routers {
            router.load(nested, None)?;
        }
        for reaction in &descriptor.reactions {
            router.add(reaction.clone())?;
        }
        if !descriptor.enabled {
            router.disable();
        }
        Ok(router)
    }

    /// Describe the current subtree so it can be built again.
    ///
    /// Ids are left unset, so every router and reaction built from the
    /// result gets a fresh one.
    pub fn descriptor(&self) -> RouterDescriptor {
        RouterDescriptor {
            id: None,
            label: self.inner.label.clone(),
            purpose: self.purpose(),
            passive: self.is_passive(),
            enabled: self.is_enabled(),
            high_water_mark: self.inner.core.high_water_mark(),
            max_flows: self.inner.core.max_flows(),
            state: self.state(),
            reactions: self.reactions().iter().map(Reaction::descriptor).collect(),
            routers: self.routers().iter().map(Router::descriptor).collect(),
        }
    }

    /// Build a detached copy of this router's subtree, then save `state` into
    /// it, feeding every changed key through its core.
    pub fn instantiate(&self, state: &Map<String, Value>) -> Result<Router, GraphError> {
        let instance = Router::from_descriptor(&self.descriptor())?;
        tracing::debug!(router = %self.inner.label, from = %self.inner.id, to = %instance.id(), "instantiate");
        instance.save(state, true);
        Ok(instance)
    }

    fn build(descriptor: &RouterDescriptor) -> Result<Self, GraphError> {
        if descriptor.label.trim().is_empty() {
            return Err(GraphError::MissingLabel);
        }
        let id = descriptor.id.clone().unwrap_or_else(NodeId::generate);
        let options = StreamOptions {
            id: None,
            high_water_mark: descriptor.high_water_mark,
            max_flows: descriptor.max_flows,
        };

        let inner = Rc::new_cyclic(|weak: &Weak<RouterInner>| {
            let routing = weak.clone();
            let core = Stream::with_options(options.clone(), move |pulse| match routing.upgrade() {
                Some(inner) => Router { inner }.classify(pulse),
                None => false,
            });
            let boundary = Stream::with_options(options.clone().with_id(id.clone()), |_| true);
            let node = Node::with_flows(id.clone(), core.clone(), core.clone());

            let adapting = weak.clone();
            node.on_adapt(move || {
                if let Some(inner) = adapting.upgrade() {
                    Router { inner }.invalidate();
                }
            });

            RouterInner {
                id,
                label: descriptor.label.clone(),
                node,
                core,
                boundary,
                props: RefCell::new(Props {
                    enabled: true,
                    ..Props::default()
                }),
                state: Rc::new(RefCell::new(Map::new())),
                cache: RefCell::new(None),
                observers: Observers::default(),
                linked: RefCell::new(Vec::new()),
            }
        });

        inner.boundary.link(&inner.core);
        Ok(Router { inner })
    }

    pub fn id(&self) -> &NodeId {
        &self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn purpose(&self) -> Option<String> {
        self.inner.props.borrow().purpose.clone()
    }

    pub fn is_passive(&self) -> bool {
        self.inner.props.borrow().passive
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.props.borrow().enabled
    }

    /// Enabled, and every ancestor is active.
    pub fn active(&self) -> bool {
        self.inner.node.is_active()
    }

    /// The dispatch stream children are attached to.
    pub fn core(&self) -> &Stream {
        &self.inner.core
    }

    /// The stream that faces a parent or an external byte adapter.
    pub fn boundary(&self) -> &Stream {
        &self.inner.boundary
    }

    pub(crate) fn node(&self) -> &Node {
        &self.inner.node
    }

    pub fn parent(&self) -> Option<Node> {
        self.inner.node.parent()
    }

    pub fn describe(&self, purpose: impl Into<String>) -> &Self {
        self.inner.props.borrow_mut().purpose = Some(purpose.into());
        self
    }

    /// A passive router lets unrecognized byproducts out, and exposes nested
    /// routers' inputs as its own.
    pub fn set_passive(&self, passive: bool) -> &Self {
        let changed = {
            let mut props = self.inner.props.borrow_mut();
            let changed = props.passive != passive;
            props.passive = passive;
            changed
        };
        if changed {
            self.inner.node.adapt();
        }
        self
    }

    pub fn enable(&self) -> &Self {
        if self.is_enabled() {
            return self;
        }
        self.inner.props.borrow_mut().enabled = true;
        self.inner.node.set_enabled(true);
        // input that piled up while cut off is not replayed
        self.inner.boundary.discard();
        self.inner.boundary.link(&self.inner.core);
        RouterToggled {
            router: &self.inner.label,
            enabled: true,
        }
        .log();
        self
    }

    pub fn disable(&self) -> &Self {
        if !self.is_enabled() {
            return self;
        }
        self.inner.props.borrow_mut().enabled = false;
        self.inner.node.set_enabled(false);
        self.inner.boundary.unlink(&self.inner.core);
        RouterToggled {
            router: &self.inner.label,
            enabled: false,
        }
        .log();
        self
    }

    /// Resolve and attach a reaction.
    pub fn add(&self, descriptor: ReactionDescriptor) -> Result<Reaction, GraphError> {
        let reaction = Reaction::new(descriptor)?;
        if self.contains(reaction.id()) {
            return Err(GraphError::Unresolved {
                label: reaction.label().to_string(),
                reason: format!("id '{}' is already attached", reaction.id()),
            });
        }
        reaction.bind_state(&self.inner.state);
        self.inner.node.add(&Element::Reaction(reaction.clone()))?;
        ChildAttached {
            router: &self.inner.label,
            child: reaction.label(),
            kind: "reaction",
        }
        .log();
        Ok(reaction)
    }

    pub fn remove_reaction(&self, id: &NodeId) -> bool {
        let Some(reaction) = self.reactions().into_iter().find(|r| r.id() == id) else {
            return false;
        };
        let removed = self.inner.node.remove(&Element::Reaction(reaction.clone()));
        if removed {
            ChildDetached {
                router: &self.inner.label,
                child: reaction.label(),
            }
            .log();
        }
        removed
    }

    /// Build a nested router from `descriptor`, seed its state and attach it.
    ///
    /// Nothing is attached unless the whole subtree resolves.
    pub fn load(&self, descriptor: &RouterDescriptor, state: Option<&Map<String, Value>>) -> Result<Router, GraphError> {
        let child = Router::from_descriptor(descriptor)?;
        if self.contains(child.id()) || child.id() == self.id() {
            return Err(GraphError::Unresolved {
                label: child.label().to_string(),
                reason: format!("id '{}' is already attached", child.id()),
            });
        }
        if let Some(state) = state {
            child.save(state, false);
        }
        self.attach(&child)?;
        Ok(child)
    }

    /// Attach an existing router as a nested child, moving it if it has another parent.
    pub fn attach(&self, child: &Router) -> Result<(), GraphError> {
        if self.inner.node.add(&Element::Router(child.clone()))? {
            ChildAttached {
                router: &self.inner.label,
                child: child.label(),
                kind: "router",
            }
            .log();
        }
        Ok(())
    }

    pub fn unload(&self, child: &Router) -> bool {
        let removed = self.inner.node.remove(&Element::Router(child.clone()));
        if removed {
            ChildDetached {
                router: &self.inner.label,
                child: child.label(),
            }
            .log();
        }
        removed
    }

    /// Detach from the parent router, if any.
    pub fn leave(&self) -> bool {
        Element::Router(self.clone()).leave()
    }

    /// Bidirectionally pipe an extra stream into the core.
    ///
    /// Linked streams are not children: they take no part in capability
    /// gating and are listed apart from reactions and nested routers.
    pub fn link(&self, stream: &Stream) -> &Self {
        {
            let mut linked = self.inner.linked.borrow_mut();
            if !linked.iter().any(|s| s.same(stream)) {
                linked.push(stream.clone());
            }
        }
        self.inner.core.link(stream);
        self
    }

    pub fn unlink(&self, stream: &Stream) -> &Self {
        self.inner.linked.borrow_mut().retain(|s| !s.same(stream));
        self.inner.core.unlink(stream);
        self
    }

    /// Streams attached with [`Router::link`], in link order.
    pub fn linked(&self) -> Vec<Stream> {
        self.inner.linked.borrow().clone()
    }

    /// External stimulus: write a fresh pulse into the boundary.
    pub fn feed<I>(&self, topic: impl Into<String>, values: I) -> &Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.inner.boundary.feed(topic, values);
        self
    }

    /// Byte adapter over the boundary using the JSON line codec.
    pub fn io(&self) -> IoAdapter {
        self.inner.boundary.io()
    }

    pub fn io_with<C>(&self, codec: C) -> IoAdapter
    where
        C: PulseCodec + 'static,
    {
        self.inner.boundary.io_with(codec)
    }

    /// Merge `partial` into the persisted state.
    ///
    /// Fires one `save` observation if any top-level key changed. With `feed`,
    /// every changed key is also written into the core as a pulse carrying the
    /// new value. Returns whether anything changed.
    pub fn save(&self, partial: &Map<String, Value>, feed: bool) -> bool {
        let changed = changed_keys(&self.inner.state.borrow(), partial);
        if changed.is_empty() {
            return false;
        }

        let snapshot = {
            let mut state = self.inner.state.borrow_mut();
            for key in &changed {
                let Some(value) = partial.get(key) else { continue };
                match state.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        state.insert(key.clone(), value.clone());
                    }
                }
            }
            state.clone()
        };

        StateSaved {
            router: &self.inner.label,
            changed: &changed,
            fed: feed,
        }
        .log();
        self.inner.observers.notify(&Observation::Save(snapshot));

        if feed {
            for key in &changed {
                let value = partial.get(key).cloned().unwrap_or(Value::Null);
                self.inner.core.feed(key.clone(), [value]);
            }
        }
        true
    }

    pub fn state(&self) -> Map<String, Value> {
        self.inner.state.borrow().clone()
    }

    pub fn on<F>(&self, kind: ObservationKind, observer: F) -> SubscriptionId
    where
        F: Fn(&Observation) + 'static,
    {
        self.inner.observers.subscribe(kind, Rc::new(observer))
    }

    /// Observe the first value of every internally produced `topic` pulse.
    pub fn on_topic<F>(&self, topic: impl Into<String>, observer: F) -> SubscriptionId
    where
        F: Fn(&Value) + 'static,
    {
        let topic = topic.into();
        self.on(ObservationKind::Topic, move |obs| {
            if let Observation::Topic { topic: seen, value } = obs {
                if *seen == topic {
                    observer(value);
                }
            }
        })
    }

    pub fn off(&self, subscription: SubscriptionId) -> bool {
        self.inner.observers.unsubscribe(subscription)
    }

    pub fn observer_count(&self, kind: ObservationKind) -> usize {
        self.inner.observers.count(kind)
    }

    pub fn children(&self) -> Vec<Element> {
        self.inner.node.children()
    }

    /// Attached reactions, in attach order.
    pub fn reactions(&self) -> Vec<Reaction> {
        self.children()
            .into_iter()
            .filter_map(|c| c.as_reaction().cloned())
            .collect()
    }

    /// Attached nested routers, in attach order.
    pub fn routers(&self) -> Vec<Router> {
        self.children()
            .into_iter()
            .filter_map(|c| c.as_router().cloned())
            .collect()
    }

    /// Depth-first search by id, this router included.
    pub fn find(&self, id: &NodeId) -> Option<Element> {
        if self.id() == id {
            return Some(Element::Router(self.clone()));
        }
        if let Some(reaction) = self.reactions().into_iter().find(|r| r.id() == id) {
            return Some(Element::Reaction(reaction));
        }
        self.routers().iter().find_map(|router| router.find(id))
    }

    /// Whether a descendant has `id`. The router itself does not count.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.reactions().iter().any(|r| r.id() == id) || self.routers().iter().any(|r| r.id() == id || r.contains(id))
    }

    fn cache(&self) -> Rc<RouterCache> {
        if let Some(cache) = self.inner.cache.borrow().as_ref() {
            return Rc::clone(cache);
        }
        let reactions: Vec<Capabilities> = self.reactions().iter().map(|r| r.capabilities().clone()).collect();
        let routers: Vec<Capabilities> = self.routers().iter().map(Router::capabilities).collect();
        let cache = Rc::new(RouterCache::compute(&reactions, &routers, self.is_passive()));
        *self.inner.cache.borrow_mut() = Some(Rc::clone(&cache));
        cache
    }

    fn invalidate(&self) {
        self.inner.cache.borrow_mut().take();
        CacheInvalidated {
            router: &self.inner.label,
        }
        .log();
        self.inner.observers.notify(&Observation::Adapt(self.inner.id.clone()));
    }

    pub fn requires(&self) -> TopicSet {
        self.cache().requires.clone()
    }

    pub fn inputs(&self) -> TopicSet {
        self.cache().inputs.clone()
    }

    pub fn outputs(&self) -> TopicSet {
        self.cache().outputs.clone()
    }

    pub fn consumes(&self) -> TopicSet {
        self.cache().consumes.clone()
    }

    pub fn absorbs(&self) -> TopicSet {
        self.cache().absorbs.clone()
    }

    /// How this router looks to its parent.
    pub fn capabilities(&self) -> Capabilities {
        let cache = self.cache();
        Capabilities {
            requires: cache.requires.clone(),
            consumes: cache.inputs.clone(),
            produces: cache.outputs.clone(),
        }
    }

    /// Whether an external pulse would get past the gate. No side effects.
    pub fn accept(&self, pulse: &Pulse) -> bool {
        pulse.is_log() || self.cache().admits(pulse.topic())
    }

    /// The core filter.
    fn classify(&self, pulse: &Pulse) -> bool {
        let id = &self.inner.id;
        let cache = self.cache();
        let notify = self.inner.observers.count(ObservationKind::Flow) > 0;
        let mut tags = Vec::new();

        if pulse.has(id) {
            if notify {
                tags.push(FlowTag::Accept);
            }
            if pulse.is_log() {
                pulse.tag(id, Visit::Accepted);
                self.inner.observers.notify(&Observation::Log(pulse.clone()));
            } else if cache.admits(pulse.topic()) {
                tracing::debug!(router = %self.inner.label, topic = pulse.topic(), "<==");
                pulse.tag(id, Visit::Accepted);
                if notify {
                    if cache.consumes.contains(pulse.topic()) {
                        tags.push(FlowTag::Consume);
                    }
                    if cache.absorbs.contains(pulse.topic()) {
                        tags.push(FlowTag::Absorb);
                    }
                }
            } else {
                pulse.tag(id, Visit::Rejected);
                if notify {
                    tags.push(FlowTag::Reject);
                    self.inner.observers.notify(&Observation::Flow {
                        pulse: pulse.clone(),
                        tags,
                    });
                }
                PulseDropped {
                    router: &self.inner.label,
                    topic: pulse.topic(),
                }
                .log();
                self.inner.observers.notify(&Observation::Dropped(pulse.clone()));
                return false;
            }
        } else {
            if pulse.is_log() {
                self.inner.observers.notify(&Observation::Log(pulse.clone()));
                return true;
            }
            if self.inner.observers.count(ObservationKind::Topic) > 0 {
                self.inner.observers.notify(&Observation::Topic {
                    topic: pulse.topic().to_string(),
                    value: pulse.value(),
                });
            }
            if notify {
                tags.push(FlowTag::Feedback);
                tags.push(if cache.consumes.contains(pulse.topic()) {
                    FlowTag::Consume
                } else {
                    FlowTag::Reject
                });
            }
            if cache.absorbs.contains(pulse.topic()) {
                tracing::debug!(router = %self.inner.label, topic = pulse.topic(), "<->");
                pulse.tag(id, Visit::Accepted);
                if notify {
                    tags.push(FlowTag::Absorb);
                }
            } else if cache.outputs.contains(pulse.topic()) {
                tracing::debug!(router = %self.inner.label, topic = pulse.topic(), "==>");
                if notify {
                    tags.push(FlowTag::Produce);
                }
            } else {
                tracing::debug!(router = %self.inner.label, topic = pulse.topic(), "<--");
                if notify {
                    tags.push(FlowTag::Byproduct);
                }
                if !self.is_passive() {
                    pulse.tag(id, Visit::Seen);
                }
            }
        }

        for reaction in self.reactions() {
            reaction.route(pulse);
        }
        if notify {
            self.inner.observers.notify(&Observation::Flow {
                pulse: pulse.clone(),
                tags,
            });
        }
        true
    }

    pub fn inspect(&self) -> Value {
        let cache = self.cache();
        json!({
            "id": self.inner.id,
            "label": self.inner.label,
            "purpose": self.purpose(),
            "passive": self.is_passive(),
            "enabled": self.is_enabled(),
            "requires": cache.requires,
            "inputs": cache.inputs,
            "outputs": cache.outputs,
            "consumes": cache.consumes,
            "absorbs": cache.absorbs,
            "reactions": self.reactions().iter().map(Reaction::inspect).collect::<Vec<_>>(),
            "routers": self.routers().iter().map(Router::inspect).collect::<Vec<_>>(),
            "streams": self.linked().iter().map(Stream::inspect).collect::<Vec<_>>(),
        })
    }

    pub fn same(&self, other: &Router) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting(kind: ObservationKind, router: &Router) -> Rc<Cell<usize>> {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        router.on(kind, move |_| h.set(h.get() + 1));
        hits
    }

    fn state(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    #[test]
    fn test_label_is_required() {
        assert_eq!(Router::new("").unwrap_err(), GraphError::MissingLabel);
    }

    #[test]
    fn test_new_router_is_enabled_and_empty() {
        let router = Router::new("root").unwrap();

        assert!(router.is_enabled());
        assert!(router.active());
        assert!(router.inputs().is_empty());
        assert!(router.boundary().is_piped_to(router.core()));
        assert!(router.core().is_piped_to(router.boundary()));
    }

    #[test]
    fn test_save_noop_when_unchanged() {
        let router = Router::new("stateful").unwrap();
        router.save(&state(json!({"a": 1})), false);
        let saves = counting(ObservationKind::Save, &router);

        assert!(!router.save(&state(json!({"a": 1})), false));
        assert_eq!(saves.get(), 0);
    }

    #[test]
    fn test_save_fires_once_with_merged_state() {
        let router = Router::new("stateful").unwrap();
        router.save(&state(json!({"a": 1, "b": {"x": 1}})), false);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        router.on(ObservationKind::Save, move |obs| {
            if let Observation::Save(state) = obs {
                sink.borrow_mut().push(Value::Object(state.clone()));
            }
        });

        assert!(router.save(&state(json!({"a": 2, "b": {"y": 2}})), false));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], json!({"a": 2, "b": {"x": 1, "y": 2}}));
        assert_eq!(Value::Object(router.state()), seen[0]);
    }

    #[test]
    fn test_save_with_feed_injects_changed_keys() {
        let router = Router::new("feeder").unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        router
            .add(ReactionDescriptor::new("watch").consumes(["a", "b"]).handler(move |_, pulse| {
                sink.borrow_mut().push((pulse.topic().to_string(), pulse.value()));
                Ok(())
            }))
            .unwrap();

        router.save(&state(json!({"a": 1})), false);
        router.save(&state(json!({"a": 1, "b": 2})), true);

        assert_eq!(*seen.borrow(), vec![("b".to_string(), json!(2))]);
    }

    #[test]
    fn test_find_and_contains() {
        let root = Router::new("root").unwrap();
        let nested = root
            .load(
                &RouterDescriptor::new("net").reaction(ReactionDescriptor::new("connect").id("net-connect").consumes(["net/connect"])),
                None,
            )
            .unwrap();

        let target = NodeId::from("net-connect");
        assert!(root.contains(&target));
        assert!(matches!(root.find(&target), Some(Element::Reaction(r)) if r.label() == "connect"));
        assert!(matches!(root.find(nested.id()), Some(Element::Router(r)) if r.same(&nested)));
        assert!(root.find(&NodeId::from("missing")).is_none());
        assert!(!root.contains(root.id()));
    }

    #[test]
    fn test_duplicate_reaction_id_rejected() {
        let router = Router::new("root").unwrap();
        router.add(ReactionDescriptor::new("a").id("dup").consumes(["x"])).unwrap();

        let err = router.add(ReactionDescriptor::new("b").id("dup").consumes(["y"])).unwrap_err();
        assert!(matches!(err, GraphError::Unresolved { .. }));
        assert_eq!(router.reactions().len(), 1);
        assert!(!router.inputs().contains("y"));
    }

    #[test]
    fn test_remove_reaction_updates_cache() {
        let router = Router::new("root").unwrap();
        let reaction = router.add(ReactionDescriptor::new("a").consumes(["x"]).produces(["z"])).unwrap();
        assert!(router.outputs().contains("z"));

        assert!(router.remove_reaction(reaction.id()));
        assert!(!router.outputs().contains("z"));
        assert!(!router.remove_reaction(reaction.id()));
    }

    #[test]
    fn test_set_passive_invalidates_cache() {
        let root = Router::new("root").unwrap();
        root.load(&RouterDescriptor::new("ws").reaction(ReactionDescriptor::new("c").consumes(["ws/connect"])), None)
            .unwrap();
        assert!(!root.inputs().contains("ws/connect"));

        root.set_passive(true);
        assert!(root.inputs().contains("ws/connect"));
    }

    #[test]
    fn test_inspect_reports_structure() {
        let root = Router::new("root").unwrap();
        root.describe("top level");
        root.add(ReactionDescriptor::new("r").consumes(["a"]).produces(["b"])).unwrap();

        let report = root.inspect();
        assert_eq!(report["label"], json!("root"));
        assert_eq!(report["purpose"], json!("top level"));
        assert_eq!(report["outputs"], json!(["b"]));
        assert_eq!(report["reactions"][0]["label"], json!("r"));
        assert_eq!(report["streams"], json!([]));
    }

    #[test]
    fn test_linked_streams_tracked_apart_from_children() {
        let router = Router::new("root").unwrap();
        let side = Stream::new();

        router.link(&side).link(&side);
        assert_eq!(router.linked().len(), 1);
        assert!(router.children().is_empty());
        assert!(router.inputs().is_empty());

        let report = router.inspect();
        assert_eq!(report["streams"][0]["id"], json!(side.id()));
        assert_eq!(report["reactions"], json!([]));

        router.unlink(&side);
        assert!(router.linked().is_empty());
        assert!(!router.core().is_piped_to(&side));
        assert!(!side.is_piped_to(router.core()));
    }

    #[test]
    fn test_descriptor_captures_subtree_without_ids() {
        let root = Router::new("root").unwrap();
        root.describe("top level").set_passive(true);
        root.save(&state(json!({"mode": "fast"})), false);
        root.add(ReactionDescriptor::new("r").id("fixed").consumes(["a"]).produces(["b"])).unwrap();
        root.load(
            &RouterDescriptor::new("nested")
                .high_water_mark(8)
                .reaction(ReactionDescriptor::new("n").consumes(["c"])),
            None,
        )
        .unwrap();

        let descriptor = root.descriptor();
        assert!(descriptor.id.is_none());
        assert_eq!(descriptor.label, "root");
        assert_eq!(descriptor.purpose.as_deref(), Some("top level"));
        assert!(descriptor.passive);
        assert_eq!(Value::Object(descriptor.state.clone()), json!({"mode": "fast"}));
        assert_eq!(descriptor.reactions.len(), 1);
        assert!(descriptor.reactions[0].id.is_none());
        assert!(descriptor.reactions[0].capabilities.produces.contains("b"));
        assert_eq!(descriptor.routers.len(), 1);
        assert_eq!(descriptor.routers[0].high_water_mark, 8);
        assert_eq!(descriptor.routers[0].reactions[0].label, "n");
    }
}
