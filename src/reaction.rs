// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Leaf handlers.
//!
//! A [`Reaction`] is built once from a fully resolved [`ReactionDescriptor`]:
//! its capability sets are plain fields, never looked up again. The owning
//! router hands it every pulse that passes the router's core; the reaction
//! keeps the ones it declares, remembers the latest payload of each required
//! topic and runs its handler when a consumed topic arrives with every
//! requirement satisfied.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::errors::{GraphError, StreamError};
use crate::graph::{Capabilities, Membership, NodeId};
use crate::pulse::{Pulse, Visit};
use crate::stream::{LogLevel, Stream, StreamOptions};

/// Handler body. Errors become `error` pulses from the reaction.
pub type Handler = Rc<dyn Fn(&Context<'_>, &Pulse) -> anyhow::Result<()>>;

pub(crate) type SharedState = Rc<RefCell<Map<String, Value>>>;

/// Resolved handler descriptor: identity, capability sets and the handler.
#[derive(Clone)]
pub struct ReactionDescriptor {
    pub id: Option<NodeId>,
    pub label: String,
    pub capabilities: Capabilities,
    pub handler: Option<Handler>,
}

impl ReactionDescriptor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
            capabilities: Capabilities::default(),
            handler: None,
        }
    }

    pub fn id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn requires<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = self.capabilities.requires(topics);
        self
    }

    pub fn consumes<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = self.capabilities.consumes(topics);
        self
    }

    pub fn produces<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = self.capabilities.produces(topics);
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Context<'_>, &Pulse) -> anyhow::Result<()> + 'static,
    {
        self.handler = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for ReactionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionDescriptor")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("capabilities", &self.capabilities)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

struct ReactionInner {
    id: NodeId,
    label: String,
    capabilities: Capabilities,
    handler: Option<Handler>,
    output: Stream,
    depends: RefCell<IndexMap<String, Vec<Value>>>,
    state: RefCell<Weak<RefCell<Map<String, Value>>>>,
    parent: Membership,
}

#[derive(Clone)]
pub struct Reaction {
    inner: Rc<ReactionInner>,
}

impl Reaction {
    pub fn new(descriptor: ReactionDescriptor) -> Result<Self, GraphError> {
        let ReactionDescriptor {
            id,
            label,
            capabilities,
            handler,
        } = descriptor;

        if label.trim().is_empty() {
            return Err(GraphError::Unresolved {
                label,
                reason: "reaction label is empty".to_string(),
            });
        }

        let id = id.unwrap_or_else(NodeId::generate);
        let output = Stream::with_options(StreamOptions::default().with_id(id.clone()), |_| true);

        Ok(Self {
            inner: Rc::new(ReactionInner {
                id,
                label,
                capabilities,
                handler,
                output,
                depends: RefCell::new(IndexMap::new()),
                state: RefCell::new(Weak::new()),
                parent: Membership::default(),
            }),
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.capabilities
    }

    /// Descriptor for an equivalent reaction with a fresh id.
    pub fn descriptor(&self) -> ReactionDescriptor {
        ReactionDescriptor {
            id: None,
            label: self.inner.label.clone(),
            capabilities: self.inner.capabilities.clone(),
            handler: self.inner.handler.clone(),
        }
    }

    /// Where everything the handler sends goes.
    pub fn output(&self) -> &Stream {
        &self.inner.output
    }

    pub(crate) fn membership(&self) -> &Membership {
        &self.inner.parent
    }

    pub(crate) fn bind_state(&self, state: &SharedState) {
        *self.inner.state.borrow_mut() = Rc::downgrade(state);
    }

    /// Not yet seen, and declared as required or consumed.
    pub fn accept(&self, pulse: &Pulse) -> bool {
        let caps = &self.inner.capabilities;
        !pulse.has(&self.inner.id)
            && (caps.requires.contains(pulse.topic()) || caps.consumes.contains(pulse.topic()))
    }

    /// Every required topic has been observed at least once.
    pub fn ready(&self) -> bool {
        let depends = self.inner.depends.borrow();
        self.inner
            .capabilities
            .requires
            .iter()
            .all(|topic| depends.contains_key(topic))
    }

    pub fn route(&self, pulse: &Pulse) {
        if !self.accept(pulse) {
            return;
        }
        pulse.tag(&self.inner.id, Visit::Accepted);

        let caps = &self.inner.capabilities;
        if caps.requires.contains(pulse.topic()) {
            self.inner
                .depends
                .borrow_mut()
                .insert(pulse.topic().to_string(), pulse.payload());
        }
        if caps.consumes.contains(pulse.topic()) && self.ready() {
            self.invoke(pulse);
        }
    }

    fn invoke(&self, pulse: &Pulse) {
        let Some(handler) = self.inner.handler.clone() else {
            return;
        };
        tracing::debug!(reaction = %self.inner.label, topic = pulse.topic(), "invoke");

        let context = Context { reaction: self };
        if let Err(err) = handler(&context, pulse) {
            let failure = StreamError::HandlerFailed {
                reaction: self.inner.id.clone(),
                topic: pulse.topic().to_string(),
                reason: format!("{:#}", err),
            };
            tracing::warn!(reaction = %self.inner.label, error = %failure, "handler failed");
            self.inner.output.error(&failure);
        }
    }

    pub fn same(&self, other: &Reaction) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn inspect(&self) -> Value {
        let caps = &self.inner.capabilities;
        json!({
            "id": self.inner.id,
            "label": self.inner.label,
            "requires": caps.requires,
            "consumes": caps.consumes,
            "produces": caps.produces,
            "ready": self.ready(),
        })
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .finish()
    }
}

/// What a handler can do while it runs.
pub struct Context<'a> {
    reaction: &'a Reaction,
}

impl Context<'_> {
    pub fn id(&self) -> &NodeId {
        self.reaction.id()
    }

    pub fn label(&self) -> &str {
        self.reaction.label()
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.reaction.capabilities()
    }

    /// Emit a pulse from this reaction.
    pub fn send<I>(&self, topic: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.reaction.output().send(topic, values);
    }

    /// Latest payload recorded for a required topic.
    pub fn fetch(&self, topic: &str) -> Option<Vec<Value>> {
        self.reaction.inner.depends.borrow().get(topic).cloned()
    }

    /// First value of the latest payload recorded for a required topic.
    pub fn get(&self, topic: &str) -> Option<Value> {
        self.fetch(topic).and_then(|values| values.into_iter().next())
    }

    /// Snapshot of the owning router's persisted state.
    pub fn state(&self) -> Map<String, Value> {
        self.reaction
            .inner
            .state
            .borrow()
            .upgrade()
            .map(|state| state.borrow().clone())
            .unwrap_or_default()
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.reaction.output().log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.reaction.output().log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.reaction.output().log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.reaction.output().log(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<usize>>, impl Fn(&Context<'_>, &Pulse) -> anyhow::Result<()>) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        (hits, move |_: &Context<'_>, _: &Pulse| {
            h.set(h.get() + 1);
            Ok(())
        })
    }

    #[test]
    fn test_empty_label_is_unresolved() {
        let err = Reaction::new(ReactionDescriptor::new("  ")).unwrap_err();
        assert!(matches!(err, GraphError::Unresolved { .. }));
    }

    #[test]
    fn test_fires_only_when_requirements_met() {
        let (hits, handler) = counter();
        let reaction = Reaction::new(
            ReactionDescriptor::new("connect")
                .requires(["module/net"])
                .consumes(["link/connect"])
                .handler(handler),
        )
        .unwrap();

        reaction.route(&Pulse::new("link/connect"));
        assert_eq!(hits.get(), 0);
        assert!(!reaction.ready());

        reaction.route(Pulse::new("module/net").add("net"));
        assert!(reaction.ready());
        reaction.route(&Pulse::new("link/connect"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_same_pulse_routed_once() {
        let (hits, handler) = counter();
        let reaction = Reaction::new(ReactionDescriptor::new("r").consumes(["a"]).handler(handler)).unwrap();
        let pulse = Pulse::new("a");

        reaction.route(&pulse);
        reaction.route(&pulse);

        assert_eq!(hits.get(), 1);
        assert_eq!(pulse.status(reaction.id()), Some(Visit::Accepted));
    }

    #[test]
    fn test_ignores_undeclared_topics() {
        let (hits, handler) = counter();
        let reaction = Reaction::new(ReactionDescriptor::new("r").consumes(["a"]).handler(handler)).unwrap();
        let pulse = Pulse::new("b");

        assert!(!reaction.accept(&pulse));
        reaction.route(&pulse);
        assert_eq!(hits.get(), 0);
        assert!(!pulse.has(reaction.id()));
    }

    #[test]
    fn test_context_send_and_fetch() {
        let reaction = Reaction::new(
            ReactionDescriptor::new("greet")
                .requires(["name"])
                .consumes(["hello"])
                .produces(["greeting"])
                .handler(|ctx, _| {
                    let name = ctx.get("name").unwrap_or_default();
                    ctx.send("greeting", [json!(format!("hello {}", name.as_str().unwrap_or("?")))]);
                    Ok(())
                }),
        )
        .unwrap();

        reaction.route(Pulse::new("name").add("ada"));
        reaction.route(&Pulse::new("hello"));

        let out = reaction.output().read_pulses();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].topic(), "greeting");
        assert_eq!(out[0].value(), json!("hello ada"));
        assert_eq!(out[0].origin(), Some(reaction.id()));
    }

    #[test]
    fn test_handler_error_becomes_error_pulse() {
        let reaction = Reaction::new(
            ReactionDescriptor::new("broken")
                .consumes(["a"])
                .handler(|_, _| Err(anyhow::anyhow!("socket refused"))),
        )
        .unwrap();

        reaction.route(&Pulse::new("a"));

        let out = reaction.output().read_pulses();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].topic(), "error");
        let message = out[0].value()["message"].as_str().unwrap().to_string();
        assert!(message.contains("socket refused"));
    }
}
