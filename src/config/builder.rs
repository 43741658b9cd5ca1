// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::{EngineOptions, HandlerRegistry, ReactionConfig, RouterConfig};
use crate::errors::ConfigError;
use crate::reaction::ReactionDescriptor;
use crate::router::{Router, RouterDescriptor};

/// Turns a `RouterConfig` tree into a live router tree.
///
/// Every handler name in the tree is resolved before any router is built, so
/// an unknown handler fails without side effects.
#[derive(Debug, Clone, Default)]
pub struct TopologyBuilder {
    engine: EngineOptions,
}

impl TopologyBuilder {
    pub fn new(engine: EngineOptions) -> Self {
        Self { engine }
    }

    pub fn build(&self, config: &RouterConfig, registry: &HandlerRegistry) -> Result<Router, ConfigError> {
        let descriptor = self.describe(config, registry)?;
        let router = Router::from_descriptor(&descriptor)?;
        tracing::info!(
            router = %router.label(),
            id = %router.id(),
            reactions = router.reactions().len(),
            routers = router.routers().len(),
            "topology built"
        );
        Ok(router)
    }

    /// Resolve a config subtree into a descriptor tree.
    pub fn describe(&self, config: &RouterConfig, registry: &HandlerRegistry) -> Result<RouterDescriptor, ConfigError> {
        let mut descriptor = RouterDescriptor::new(config.label.clone())
            .passive(config.passive)
            .enabled(config.enabled)
            .high_water_mark(config.high_water_mark.unwrap_or_else(|| self.engine.get_high_water_mark()))
            .max_flows(config.max_flows.unwrap_or_else(|| self.engine.get_max_flows()))
            .state(config.state.clone());
        if let Some(id) = &config.id {
            descriptor = descriptor.id(id.as_str());
        }
        if let Some(purpose) = &config.purpose {
            descriptor = descriptor.purpose(purpose.clone());
        }

        for reaction in &config.reactions {
            descriptor = descriptor.reaction(resolve_reaction(reaction, registry)?);
        }
        for nested in &config.routers {
            descriptor = descriptor.router(self.describe(nested, registry)?);
        }
        Ok(descriptor)
    }
}

fn resolve_reaction(config: &ReactionConfig, registry: &HandlerRegistry) -> Result<ReactionDescriptor, ConfigError> {
    let mut descriptor = ReactionDescriptor::new(config.label.clone())
        .requires(config.requires.iter().cloned())
        .consumes(config.consumes.iter().cloned())
        .produces(config.produces.iter().cloned());
    if let Some(id) = &config.id {
        descriptor = descriptor.id(id.as_str());
    }
    if let Some(name) = &config.handler {
        let handler = registry.resolve(name).ok_or_else(|| ConfigError::UnresolvedHandler {
            reaction: config.label.clone(),
            handler: name.clone(),
        })?;
        descriptor.handler = Some(handler);
    }
    Ok(descriptor)
}
