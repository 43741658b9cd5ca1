// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::graph::NodeId;
use crate::pulse::Pulse;

/// Classification step recorded on a `flow` observation, in the order taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowTag {
    Accept,
    Reject,
    Consume,
    Absorb,
    Feedback,
    Produce,
    Byproduct,
}

impl fmt::Display for FlowTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowTag::Accept => "accept",
            FlowTag::Reject => "reject",
            FlowTag::Consume => "consume",
            FlowTag::Absorb => "absorb",
            FlowTag::Feedback => "feedback",
            FlowTag::Produce => "produce",
            FlowTag::Byproduct => "byproduct",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    Flow,
    Dropped,
    Log,
    Save,
    Adapt,
    Topic,
}

/// Something a router reports to its observers.
#[derive(Debug, Clone)]
pub enum Observation {
    /// A pulse was classified; tags list the steps taken.
    Flow { pulse: Pulse, tags: Vec<FlowTag> },
    /// An external pulse failed capability gating.
    Dropped(Pulse),
    Log(Pulse),
    /// Persisted state changed; carries the full updated state.
    Save(Map<String, Value>),
    /// The capability cache was invalidated by a topology change.
    Adapt(NodeId),
    /// An internally produced pulse passed the core; carries its first value.
    Topic { topic: String, value: Value },
}

impl Observation {
    pub fn kind(&self) -> ObservationKind {
        match self {
            Observation::Flow { .. } => ObservationKind::Flow,
            Observation::Dropped(_) => ObservationKind::Dropped,
            Observation::Log(_) => ObservationKind::Log,
            Observation::Save(_) => ObservationKind::Save,
            Observation::Adapt(_) => ObservationKind::Adapt,
            Observation::Topic { .. } => ObservationKind::Topic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Observer = Rc<dyn Fn(&Observation)>;

/// Explicit observer registry with per-kind counts.
#[derive(Default)]
pub struct Observers {
    next: Cell<u64>,
    entries: RefCell<Vec<(SubscriptionId, ObservationKind, Observer)>>,
}

impl Observers {
    pub fn subscribe(&self, kind: ObservationKind, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next.get());
        self.next.set(self.next.get() + 1);
        self.entries.borrow_mut().push((id, kind, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry, _, _)| *entry != id);
        before != entries.len()
    }

    pub fn count(&self, kind: ObservationKind) -> usize {
        self.entries.borrow().iter().filter(|(_, k, _)| *k == kind).count()
    }

    /// Deliver to every observer of the observation's kind. Observers may
    /// subscribe or unsubscribe while being notified.
    pub fn notify(&self, observation: &Observation) {
        let kind = observation.kind();
        let targets: Vec<Observer> = self
            .entries
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, observer)| Rc::clone(observer))
            .collect();
        for observer in targets {
            observer(observation);
        }
    }
}
