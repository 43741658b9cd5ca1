// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for stream transform and pipe events.
//!
//! This module contains message types for logging events related to:
//! * Chunks rejected by a transform (type violations)
//! * Deferred pushes and their resumption (drain-retry)
//! * Pipe fan-out beyond the configured warning threshold

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A chunk was rejected by a stream transform.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ChunkRejected<'a> {
    pub stream_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ChunkRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Stream '{}' rejected chunk: {}", self.stream_id, self.error)
    }
}

impl StructuredLog for ChunkRejected<'_> {
    fn log(&self) {
        tracing::error!(
            stream_id = self.stream_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "chunk_rejected",
            span_name = name,
            stream_id = self.stream_id,
            error = %self.error,
        )
    }
}

/// A push hit a full readable buffer; the stream now waits for drain.
///
/// # Log Level
/// `debug!` - Expected flow-control event
///
/// # Example
/// ```
/// use kinetic_flow::observability::messages::stream::BackpressureDeferred;
///
/// let msg = BackpressureDeferred {
///     stream_id: "core",
///     topic: "net/connect",
///     buffered: 100,
/// };
///
/// assert!(msg.to_string().contains("waiting for drain"));
/// ```
pub struct BackpressureDeferred<'a> {
    pub stream_id: &'a str,
    pub topic: &'a str,
    pub buffered: usize,
}

impl Display for BackpressureDeferred<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream '{}' deferred '{}' with {} chunks buffered, waiting for drain",
            self.stream_id, self.topic, self.buffered
        )
    }
}

impl StructuredLog for BackpressureDeferred<'_> {
    fn log(&self) {
        tracing::debug!(
            stream_id = self.stream_id,
            topic = self.topic,
            buffered = self.buffered,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "backpressure_deferred",
            span_name = name,
            stream_id = self.stream_id,
            topic = self.topic,
            buffered = self.buffered,
        )
    }
}

/// The deferred chunk was pushed after drain.
///
/// # Log Level
/// `debug!` - Expected flow-control event
pub struct BackpressureResumed<'a> {
    pub stream_id: &'a str,
    pub topic: &'a str,
}

impl Display for BackpressureResumed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream '{}' drained, resumed with '{}'",
            self.stream_id, self.topic
        )
    }
}

impl StructuredLog for BackpressureResumed<'_> {
    fn log(&self) {
        tracing::debug!(
            stream_id = self.stream_id,
            topic = self.topic,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "backpressure_resumed",
            span_name = name,
            stream_id = self.stream_id,
            topic = self.topic,
        )
    }
}

/// A stream is piped into more destinations than the warning threshold.
///
/// # Log Level
/// `warn!` - Potential issue; not a hard limit
pub struct PipeLimitExceeded<'a> {
    pub stream_id: &'a str,
    pub pipes: usize,
    pub max_flows: usize,
}

impl Display for PipeLimitExceeded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream '{}' has {} pipes, more than the advised maximum of {}",
            self.stream_id, self.pipes, self.max_flows
        )
    }
}

impl StructuredLog for PipeLimitExceeded<'_> {
    fn log(&self) {
        tracing::warn!(
            stream_id = self.stream_id,
            pipes = self.pipes,
            max_flows = self.max_flows,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "pipe_limit_exceeded",
            span_name = name,
            stream_id = self.stream_id,
            pipes = self.pipes,
            max_flows = self.max_flows,
        )
    }
}
