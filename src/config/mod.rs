// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod builder;
mod loader;
mod registry;
mod validation;

#[cfg(test)]
mod integration_tests;
pub mod consts;

pub use builder::TopologyBuilder;
pub use loader::{
    load_and_validate_config, load_config, Config, EngineOptions, LoggingOptions, ReactionConfig,
    RouterConfig,
};
pub use registry::{HandlerFactory, HandlerRegistry};
pub use validation::validate_topology;
