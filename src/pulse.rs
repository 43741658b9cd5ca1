// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The message envelope that travels through every stream in the graph.
//!
//! A [`Pulse`] is a cheap, shared handle: cloning it clones the handle, not the
//! envelope. Every pipe that carries a pulse therefore sees the same visitation
//! record, which is what lets a ring or a diamond of streams terminate without
//! any knowledge of the graph shape.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::{NodeId, TopicSet};

/// Topics reserved for log pulses. These always bypass capability gating.
pub const LOG_TOPICS: [&str; 4] = ["error", "warn", "info", "debug"];

/// Visitation status recorded by a node on a pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visit {
    /// The node has handled the pulse but has not ruled on it.
    Seen,
    Accepted,
    Rejected,
}

struct PulseInner {
    topic: String,
    origin: Option<NodeId>,
    payload: RefCell<Vec<Value>>,
    visited: RefCell<IndexMap<NodeId, Visit>>,
}

/// Immutable-topic message envelope with an append-only payload.
#[derive(Clone)]
pub struct Pulse(Rc<PulseInner>);

impl Pulse {
    pub fn new(topic: impl Into<String>) -> Self {
        Self::build(topic.into(), None)
    }

    pub fn with_origin(topic: impl Into<String>, origin: NodeId) -> Self {
        Self::build(topic.into(), Some(origin))
    }

    fn build(topic: String, origin: Option<NodeId>) -> Self {
        Self(Rc::new(PulseInner {
            topic,
            origin,
            payload: RefCell::new(Vec::new()),
            visited: RefCell::new(IndexMap::new()),
        }))
    }

    pub fn topic(&self) -> &str {
        &self.0.topic
    }

    pub fn origin(&self) -> Option<&NodeId> {
        self.0.origin.as_ref()
    }

    /// Append a value to the payload.
    pub fn add(&self, value: impl Into<Value>) -> &Self {
        self.0.payload.borrow_mut().push(value.into());
        self
    }

    /// Append every value to the payload, preserving order.
    pub fn extend<I>(&self, values: I) -> &Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.0.payload.borrow_mut().extend(values);
        self
    }

    /// Snapshot of the payload.
    pub fn payload(&self) -> Vec<Value> {
        self.0.payload.borrow().clone()
    }

    /// First payload entry, or `Value::Null` when the payload is empty.
    pub fn value(&self) -> Value {
        self.0.payload.borrow().first().cloned().unwrap_or(Value::Null)
    }

    /// Record that `node` visited this pulse with `status`.
    ///
    /// Records are never removed; a later tag by the same node overwrites the
    /// status only.
    pub fn tag(&self, node: &NodeId, status: Visit) -> &Self {
        self.0.visited.borrow_mut().insert(node.clone(), status);
        self
    }

    pub fn has(&self, node: &NodeId) -> bool {
        self.0.visited.borrow().contains_key(node)
    }

    pub fn status(&self, node: &NodeId) -> Option<Visit> {
        self.0.visited.borrow().get(node).copied()
    }

    /// Number of nodes that have visited this pulse.
    pub fn visits(&self) -> usize {
        self.0.visited.borrow().len()
    }

    /// True iff this pulse's topic is a member of `set`.
    pub fn matches(&self, set: &TopicSet) -> bool {
        set.contains(self.topic())
    }

    pub fn is_log(&self) -> bool {
        LOG_TOPICS.contains(&self.topic())
    }

    /// Two handles refer to the same envelope.
    pub fn same(&self, other: &Pulse) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn to_record(&self) -> PulseRecord {
        PulseRecord {
            topic: self.0.topic.clone(),
            payload: self.payload(),
        }
    }
}

impl fmt::Debug for Pulse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pulse")
            .field("topic", &self.0.topic)
            .field("origin", &self.0.origin)
            .field("payload", &self.0.payload.borrow())
            .field("visits", &self.visits())
            .finish()
    }
}

impl fmt::Display for Pulse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pulse({})", self.0.topic)
    }
}

/// Serializable form of a pulse. The visitation record stays in-process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseRecord {
    pub topic: String,
    #[serde(default)]
    pub payload: Vec<Value>,
}

impl From<PulseRecord> for Pulse {
    fn from(record: PulseRecord) -> Self {
        let pulse = Pulse::new(record.topic);
        pulse.extend(record.payload);
        pulse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_appends_in_order() {
        let pulse = Pulse::new("greeting");
        pulse.add("hello").add(42);

        assert_eq!(pulse.payload(), vec![json!("hello"), json!(42)]);
        assert_eq!(pulse.value(), json!("hello"));
    }

    #[test]
    fn test_empty_payload_value_is_null() {
        assert_eq!(Pulse::new("empty").value(), Value::Null);
    }

    #[test]
    fn test_tag_records_visits_monotonically() {
        let pulse = Pulse::new("t");
        let a = NodeId::from("a");
        let b = NodeId::from("b");

        assert!(!pulse.has(&a));
        pulse.tag(&a, Visit::Seen);
        pulse.tag(&b, Visit::Rejected);
        pulse.tag(&a, Visit::Accepted);

        assert!(pulse.has(&a));
        assert_eq!(pulse.status(&a), Some(Visit::Accepted));
        assert_eq!(pulse.status(&b), Some(Visit::Rejected));
        assert_eq!(pulse.visits(), 2);
    }

    #[test]
    fn test_clones_share_visitation_record() {
        let pulse = Pulse::new("shared");
        let copy = pulse.clone();
        let id = NodeId::from("n");
        copy.tag(&id, Visit::Seen);

        assert!(pulse.has(&id));
        assert!(pulse.same(&copy));
    }

    #[test]
    fn test_matches_capability_set() {
        let pulse = Pulse::new("net/connect");
        let set: TopicSet = ["net/connect", "net/listen"].into_iter().map(String::from).collect();
        let other: TopicSet = ["ws/connect"].into_iter().map(String::from).collect();

        assert!(pulse.matches(&set));
        assert!(!pulse.matches(&other));
        assert!(!pulse.matches(&TopicSet::new()));
    }

    #[test]
    fn test_log_topics() {
        for topic in LOG_TOPICS {
            assert!(Pulse::new(topic).is_log(), "{} should be a log topic", topic);
        }
        assert!(!Pulse::new("errors").is_log());
    }

    #[test]
    fn test_record_roundtrip_drops_visits() {
        let pulse = Pulse::new("state");
        pulse.add(json!({"a": 1}));
        pulse.tag(&NodeId::from("x"), Visit::Accepted);

        let restored = Pulse::from(pulse.to_record());
        assert_eq!(restored.topic(), "state");
        assert_eq!(restored.payload(), vec![json!({"a": 1})]);
        assert_eq!(restored.visits(), 0);
    }
}
