// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Serialize;

use crate::graph::{union_of, Capabilities, TopicSet};

/// Capability unions derived from a router's direct children.
///
/// * `requires` - requires of every reaction and nested router
/// * `inputs` - consumes and requires of every reaction, plus nested routers when passive
/// * `outputs` - produces of every reaction
/// * `consumes` - consumes and requires of every reaction
/// * `absorbs` - inputs of every nested router
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterCache {
    pub requires: TopicSet,
    pub inputs: TopicSet,
    pub outputs: TopicSet,
    pub consumes: TopicSet,
    pub absorbs: TopicSet,
}

impl RouterCache {
    /// `reactions` are reaction capability sets; `routers` are nested routers
    /// described as `{requires, consumes: inputs, produces: outputs}`.
    pub fn compute(reactions: &[Capabilities], routers: &[Capabilities], passive: bool) -> Self {
        let requires = union_of(reactions.iter().chain(routers), |c| c.requires.clone());

        let mut inputs = union_of(reactions, Capabilities::inputs);
        if passive {
            inputs.extend(union_of(routers, Capabilities::inputs));
        }

        Self {
            requires,
            inputs,
            outputs: union_of(reactions, |c| c.produces.clone()),
            consumes: union_of(reactions, Capabilities::inputs),
            absorbs: union_of(routers, |c| c.consumes.clone()),
        }
    }

    /// Topics an external pulse may carry to get past the gate.
    pub fn admits(&self, topic: &str) -> bool {
        self.inputs.contains(topic) || self.requires.contains(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(topics: &[&str]) -> TopicSet {
        topics.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_compute_unions() {
        let reactions = vec![
            Capabilities::new().requires(["module/net"]).consumes(["net/connect"]).produces(["net/socket"]),
            Capabilities::new().consumes(["net/listen"]).produces(["net/server", "net/socket"]),
        ];
        let routers = vec![Capabilities::new().requires(["ws/url"]).consumes(["ws/connect", "ws/url"])];

        let cache = RouterCache::compute(&reactions, &routers, false);

        assert_eq!(cache.requires, set(&["module/net", "ws/url"]));
        assert_eq!(cache.inputs, set(&["module/net", "net/connect", "net/listen"]));
        assert_eq!(cache.outputs, set(&["net/server", "net/socket"]));
        assert_eq!(cache.consumes, cache.inputs);
        assert_eq!(cache.absorbs, set(&["ws/connect", "ws/url"]));
    }

    #[test]
    fn test_passive_router_exposes_nested_inputs() {
        let routers = vec![Capabilities::new().consumes(["ws/connect"])];

        let strict = RouterCache::compute(&[], &routers, false);
        let passive = RouterCache::compute(&[], &routers, true);

        assert!(!strict.admits("ws/connect"));
        assert!(passive.admits("ws/connect"));
    }

    #[test]
    fn test_empty_router_admits_nothing() {
        let cache = RouterCache::compute(&[], &[], false);
        assert!(!cache.admits("anything"));
    }
}
