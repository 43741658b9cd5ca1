// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_HIGH_WATER_MARK, DEFAULT_LOG_FILTER, DEFAULT_MAX_FLOWS, DEFAULT_MAX_LINE_LENGTH,
};
use crate::errors::ConfigError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Top-level configuration for a hosted topology.
///
/// Loaded from YAML (`.yaml`/`.yml`) or TOML (`.toml`), chosen by file
/// extension.
///
/// # Fields
/// * `engine` - Stream tuning shared by every router in the topology (optional)
/// * `logging` - Subscriber settings for the binary (optional)
/// * `topology` - The root router and everything nested under it
///
/// # Example
/// ```yaml
/// engine:
///   high_water_mark: 100
///   max_line_length: 65536
/// logging:
///   filter: kinetic_flow=debug
/// topology:
///   label: root
///   passive: true
///   reactions:
///     - label: echo
///       handler: echo
///       consumes: [ping]
///       produces: [pong]
/// ```
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineOptions,
    #[serde(default)]
    pub logging: LoggingOptions,
    pub topology: RouterConfig,
}

/// Stream tuning. Unset values fall back to `config::consts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineOptions {
    pub high_water_mark: Option<usize>,
    pub max_flows: Option<usize>,
    pub max_line_length: Option<usize>,
}

impl EngineOptions {
    pub fn get_high_water_mark(&self) -> usize {
        self.high_water_mark.unwrap_or(DEFAULT_HIGH_WATER_MARK)
    }

    pub fn get_max_flows(&self) -> usize {
        self.max_flows.unwrap_or(DEFAULT_MAX_FLOWS)
    }

    pub fn get_max_line_length(&self) -> usize {
        self.max_line_length.unwrap_or(DEFAULT_MAX_LINE_LENGTH)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingOptions {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` still wins
    pub filter: Option<String>,
}

impl LoggingOptions {
    pub fn get_filter(&self) -> &str {
        self.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}

/// Declarative router. Mirrors `RouterDescriptor`, with reactions naming
/// registered handlers instead of carrying closures.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    pub id: Option<String>,
    #[serde(default)]
    pub label: String,
    pub purpose: Option<String>,
    #[serde(default)]
    pub passive: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Overrides `engine.high_water_mark` for this router's streams
    pub high_water_mark: Option<usize>,
    pub max_flows: Option<usize>,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub reactions: Vec<ReactionConfig>,
    #[serde(default)]
    pub routers: Vec<RouterConfig>,
}

fn enabled_by_default() -> bool {
    true
}

/// A reaction as written in a configuration file.
///
/// # Example
/// ```yaml
/// id: net-connect
/// label: connect
/// handler: echo
/// requires: [module/net]
/// consumes: [net/connect]
/// produces: [net/socket]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionConfig {
    pub id: Option<String>,
    #[serde(default)]
    pub label: String,
    /// Name of a handler in the `HandlerRegistry`; none means a passive sink
    pub handler: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub consumes: Vec<String>,
    #[serde(default)]
    pub produces: Vec<String>,
}

/// Load a config from a YAML or TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let content = fs::read_to_string(path)?;
    let cfg = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        "toml" => toml::from_str(&content)?,
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };
    Ok(cfg)
}

/// Load and validate a config file
///
/// Every validation problem is reported at once, not just the first.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;
    crate::config::validate_topology(&cfg.topology).map_err(ConfigError::Invalid)?;
    Ok(cfg)
}
