// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging throughout the engine. Message types follow a struct-based pattern
//! with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep field names consistent between the human-readable line and the structured event
//! * Provide consistent, structured logging output
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::stream` - transform faults, backpressure and pipe wiring
//! * `messages::router` - routing decisions, topology changes and state saves
//! * `messages::io` - byte-stream framing
//!
//! # Usage
//!
//! ```rust
//! use kinetic_flow::observability::messages::{stream::BackpressureDeferred, StructuredLog};
//!
//! BackpressureDeferred {
//!     stream_id: "core",
//!     topic: "net/connect",
//!     buffered: 100,
//! }
//! .log();
//! ```

pub mod messages;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter` when it is set. Output goes to stderr so
/// that stdout stays free for the byte-stream bridge.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
