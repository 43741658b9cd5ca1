// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

use thiserror::Error;

/// Problems found while validating a topology configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Two elements in the topology share an explicit ID
    DuplicateId {
        /// The duplicated ID
        id: String,
    },
    /// A router or reaction was declared without a label
    MissingLabel {
        /// Path of labels from the root to the offending element
        path: Vec<String>,
    },
    /// A reaction declares neither consumed nor required topics, so it can never fire
    UnreachableReaction {
        /// The reaction label
        reaction: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DuplicateId { id } => {
                write!(f, "Duplicate element ID: '{}'", id)
            }
            ValidationError::MissingLabel { path } => {
                if path.is_empty() {
                    write!(f, "Root router is missing a label")
                } else {
                    write!(f, "Element under '{}' is missing a label", path.join(" -> "))
                }
            }
            ValidationError::UnreachableReaction { reaction } => {
                write!(
                    f,
                    "Reaction '{}' declares no consumed or required topics and can never fire",
                    reaction
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors from loading configuration files and building topologies from them.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported configuration format '{0}' (expected .yaml, .yml or .toml)")]
    UnsupportedFormat(String),

    #[error("configuration validation failed:\n{}", render(.0))]
    Invalid(Vec<ValidationError>),

    #[error("reaction '{reaction}' references unknown handler '{handler}'")]
    UnresolvedHandler { reaction: String, handler: String },

    #[error(transparent)]
    Graph(#[from] crate::errors::GraphError),
}

fn render(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
