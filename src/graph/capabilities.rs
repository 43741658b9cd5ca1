// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A set of topic names. Ordered so that inspection output is stable.
pub type TopicSet = BTreeSet<String>;

/// Identity of any addressable element in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<str> for NodeId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Declared capability sets of an element.
///
/// * `requires` - topics that must have been observed before the element fires
/// * `consumes` - topics the element takes as input
/// * `produces` - topics the element may emit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub requires: TopicSet,
    #[serde(default)]
    pub consumes: TopicSet,
    #[serde(default)]
    pub produces: TopicSet,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requires<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(topics.into_iter().map(Into::into));
        self
    }

    pub fn consumes<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumes.extend(topics.into_iter().map(Into::into));
        self
    }

    pub fn produces<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces.extend(topics.into_iter().map(Into::into));
        self
    }

    /// `consumes ∪ requires`: every topic this element takes in.
    pub fn inputs(&self) -> TopicSet {
        self.consumes.union(&self.requires).cloned().collect()
    }
}

/// Union of a projection over a sequence of elements.
pub fn union_of<'a, I, F>(items: I, project: F) -> TopicSet
where
    I: IntoIterator<Item = &'a Capabilities>,
    F: Fn(&'a Capabilities) -> TopicSet,
{
    items.into_iter().flat_map(project).collect()
}
