// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Composition layer: identities, capability sets, nodes and the element variant.
//!
//! Membership is a tree: every element is a child of at most one parent at a
//! time. The data-flow pipes wired by that membership may still form cycles,
//! which the streams tolerate through per-pulse visitation records.

mod capabilities;
mod element;
mod node;

pub use capabilities::{union_of, Capabilities, NodeId, TopicSet};
pub use element::Element;
pub use node::Node;

pub(crate) use node::Membership;
