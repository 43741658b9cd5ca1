// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::GraphError;
use crate::graph::{Capabilities, Membership, Node, NodeId};
use crate::pulse::Pulse;
use crate::reaction::Reaction;
use crate::router::Router;
use crate::stream::Stream;

/// Any element that can be a member of a node.
///
/// Dispatch happens on the variant; every kind honours the same contract:
/// `accept` (would this element take the pulse), `route` (hand it the pulse),
/// `describe` (declared capability sets) and its `input`/`output` streams for
/// wiring.
#[derive(Clone, Debug)]
pub enum Element {
    Stream(Stream),
    Node(Node),
    Reaction(Reaction),
    Router(Router),
}

impl Element {
    pub fn id(&self) -> &NodeId {
        match self {
            Element::Stream(stream) => stream.id(),
            Element::Node(node) => node.id(),
            Element::Reaction(reaction) => reaction.id(),
            Element::Router(router) => router.id(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Element::Stream(_) => "stream",
            Element::Node(_) => "node",
            Element::Reaction(_) => "reaction",
            Element::Router(_) => "router",
        }
    }

    /// Stream the parent pipes into. Reactions are invoked directly instead.
    pub fn input(&self) -> Option<Stream> {
        match self {
            Element::Stream(stream) => Some(stream.clone()),
            Element::Node(node) => Some(node.inflow().clone()),
            Element::Reaction(_) => None,
            Element::Router(router) => Some(router.boundary().clone()),
        }
    }

    /// Stream piped back into the parent.
    pub fn output(&self) -> Option<Stream> {
        match self {
            Element::Stream(stream) => Some(stream.clone()),
            Element::Node(node) => Some(node.outflow().clone()),
            Element::Reaction(reaction) => Some(reaction.output().clone()),
            Element::Router(router) => Some(router.boundary().clone()),
        }
    }

    pub fn describe(&self) -> Capabilities {
        match self {
            Element::Stream(_) => Capabilities::default(),
            Element::Node(node) => node.describe(),
            Element::Reaction(reaction) => reaction.capabilities().clone(),
            Element::Router(router) => router.capabilities(),
        }
    }

    /// Whether this element would take `pulse`. Has no side effects.
    pub fn accept(&self, pulse: &Pulse) -> bool {
        match self {
            Element::Stream(stream) => !stream.seen(pulse),
            Element::Node(node) => !node.inflow().seen(pulse),
            Element::Reaction(reaction) => reaction.accept(pulse),
            Element::Router(router) => router.accept(pulse),
        }
    }

    pub fn route(&self, pulse: &Pulse) {
        match self {
            Element::Stream(stream) => {
                stream.write(pulse.clone());
            }
            Element::Node(node) => {
                node.inflow().write(pulse.clone());
            }
            Element::Reaction(reaction) => reaction.route(pulse),
            Element::Router(router) => {
                router.boundary().write(pulse.clone());
            }
        }
    }

    /// The node of a composable element.
    pub(crate) fn node(&self) -> Option<Node> {
        match self {
            Element::Node(node) => Some(node.clone()),
            Element::Router(router) => Some(router.node().clone()),
            Element::Stream(_) | Element::Reaction(_) => None,
        }
    }

    fn membership(&self) -> &Membership {
        match self {
            Element::Stream(stream) => stream.membership(),
            Element::Node(node) => node.membership(),
            Element::Reaction(reaction) => reaction.membership(),
            Element::Router(router) => router.node().membership(),
        }
    }

    pub fn parent(&self) -> Option<Node> {
        self.membership().get()
    }

    pub(crate) fn set_parent(&self, parent: Option<&Node>) {
        self.membership().set(parent);
    }

    /// Become a child of `parent`, which must be a node or a router.
    pub fn join(&self, parent: &Element) -> Result<(), GraphError> {
        let Some(node) = parent.node() else {
            return Err(GraphError::NotComposable {
                target: parent.id().clone(),
                kind: parent.kind(),
            });
        };
        node.add(self)?;
        Ok(())
    }

    /// Detach from the current parent. Returns false if there was none.
    pub fn leave(&self) -> bool {
        match self.parent() {
            Some(parent) => parent.remove(self),
            None => false,
        }
    }

    /// Same underlying element, not merely the same ID.
    pub fn same(&self, other: &Element) -> bool {
        match (self, other) {
            (Element::Stream(a), Element::Stream(b)) => a.same(b),
            (Element::Node(a), Element::Node(b)) => a.same(b),
            (Element::Reaction(a), Element::Reaction(b)) => a.same(b),
            (Element::Router(a), Element::Router(b)) => a.same(b),
            _ => false,
        }
    }

    pub fn as_reaction(&self) -> Option<&Reaction> {
        match self {
            Element::Reaction(reaction) => Some(reaction),
            _ => None,
        }
    }

    pub fn as_router(&self) -> Option<&Router> {
        match self {
            Element::Router(router) => Some(router),
            _ => None,
        }
    }
}

impl From<Stream> for Element {
    fn from(stream: Stream) -> Self {
        Element::Stream(stream)
    }
}

impl From<Node> for Element {
    fn from(node: Node) -> Self {
        Element::Node(node)
    }
}

impl From<Reaction> for Element {
    fn from(reaction: Reaction) -> Self {
        Element::Reaction(reaction)
    }
}

impl From<Router> for Element {
    fn from(router: Router) -> Self {
        Element::Router(router)
    }
}
