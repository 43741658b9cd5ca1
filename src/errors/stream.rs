// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised inside a stream's transform.
//!
//! None of these unwind across node boundaries. A stream that hits one logs it
//! and turns it into an `error` pulse on its own readable side.

use thiserror::Error;

use crate::graph::NodeId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// A chunk that is not a pulse reached a pulse transform.
    #[error("incompatible chunk received by stream '{stream}': expected a pulse, got {found}")]
    IncompatibleChunk { stream: NodeId, found: &'static str },

    /// The stream was destroyed and no longer accepts pushes.
    #[error("stream '{stream}' is destroyed")]
    Destroyed { stream: NodeId },

    /// A reaction handler returned an error.
    #[error("reaction '{reaction}' failed on '{topic}': {reason}")]
    HandlerFailed {
        reaction: NodeId,
        topic: String,
        reason: String,
    },
}
