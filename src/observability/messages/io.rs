// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the byte-stream adapter.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A line could not be decoded into a pulse and was dropped.
///
/// # Log Level
/// `warn!` - Bad input, processing continues
///
/// # Example
/// ```
/// use kinetic_flow::observability::messages::io::FrameDecodeFailed;
///
/// let error = std::io::Error::new(std::io::ErrorKind::InvalidData, "not json");
/// let msg = FrameDecodeFailed {
///     adapter_id: "io-1",
///     error: &error,
/// };
///
/// assert_eq!(msg.to_string(), "Adapter 'io-1' dropped malformed frame: not json");
/// ```
pub struct FrameDecodeFailed<'a> {
    pub adapter_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for FrameDecodeFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Adapter '{}' dropped malformed frame: {}",
            self.adapter_id, self.error
        )
    }
}

impl StructuredLog for FrameDecodeFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            adapter_id = self.adapter_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "frame_decode_failed",
            span_name = name,
            adapter_id = self.adapter_id,
            error = %self.error,
        )
    }
}

/// A pulse could not be encoded for the byte side and was not written.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct FrameEncodeFailed<'a> {
    pub adapter_id: &'a str,
    pub topic: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for FrameEncodeFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Adapter '{}' failed to encode '{}': {}",
            self.adapter_id, self.topic, self.error
        )
    }
}

impl StructuredLog for FrameEncodeFailed<'_> {
    fn log(&self) {
        tracing::error!(
            adapter_id = self.adapter_id,
            topic = self.topic,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "frame_encode_failed",
            span_name = name,
            adapter_id = self.adapter_id,
            topic = self.topic,
            error = %self.error,
        )
    }
}

/// A bridge session started pumping bytes for an adapter.
///
/// # Log Level
/// `info!` - Important operational event
pub struct BridgeOpened<'a> {
    pub adapter_id: &'a str,
    pub max_line_length: usize,
}

impl Display for BridgeOpened<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Bridge for adapter '{}' opened (max line length {})",
            self.adapter_id, self.max_line_length
        )
    }
}

impl StructuredLog for BridgeOpened<'_> {
    fn log(&self) {
        tracing::info!(
            adapter_id = self.adapter_id,
            max_line_length = self.max_line_length,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "bridge_opened",
            span_name = name,
            adapter_id = self.adapter_id,
            max_line_length = self.max_line_length,
        )
    }
}

/// The bridge reached end of input.
///
/// # Log Level
/// `info!` - Important operational event
pub struct BridgeClosed<'a> {
    pub adapter_id: &'a str,
    pub bytes_in: usize,
    pub bytes_out: usize,
}

impl Display for BridgeClosed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Bridge for adapter '{}' closed: {} bytes in, {} bytes out",
            self.adapter_id, self.bytes_in, self.bytes_out
        )
    }
}

impl StructuredLog for BridgeClosed<'_> {
    fn log(&self) {
        tracing::info!(
            adapter_id = self.adapter_id,
            bytes_in = self.bytes_in,
            bytes_out = self.bytes_out,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "bridge_closed",
            span_name = name,
            adapter_id = self.adapter_id,
            bytes_in = self.bytes_in,
            bytes_out = self.bytes_out,
        )
    }
}
