// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::graph::NodeId;

/// Construction-time failures. Reported synchronously to whoever attempted the
/// mutation; the topology is left exactly as it was.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// The target cannot hold children (a raw stream or a reaction).
    #[error("'{target}' is a {kind} and cannot accept children")]
    NotComposable { target: NodeId, kind: &'static str },

    /// The element would become its own ancestor.
    #[error("'{child}' cannot join its own descendant '{parent}'")]
    CyclicMembership { child: NodeId, parent: NodeId },

    /// A descriptor could not be resolved into a runtime element.
    #[error("unable to resolve '{label}': {reason}")]
    Unresolved { label: String, reason: String },

    #[error("a router requires a non-empty label")]
    MissingLabel,
}
