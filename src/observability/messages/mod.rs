// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] to emit the same information as structured `tracing` fields.
//!
//! # Organization
//!
//! * `stream` - stream transform and pipe events
//! * `router` - router classification, topology and state events
//! * `io` - byte-stream adapter events

use tracing::Span;

pub mod io;
pub mod router;
pub mod stream;

/// A log message that knows its own level and fields.
pub trait StructuredLog {
    /// Emit the message as a `tracing` event at its designated level.
    fn log(&self);

    /// Open a span carrying the message fields.
    fn span(&self, name: &str) -> Span;
}
