// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Byte-stream adapter: pulses on one side, newline-delimited frames on the other.

use std::cell::RefCell;
use std::io::ErrorKind;
use std::rc::{Rc, Weak};

use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use super::{Chunk, PulseCodec, Stream, StreamInner, StreamOptions, Transform};
use crate::config::consts::DEFAULT_MAX_LINE_LENGTH;
use crate::errors::CodecError;
use crate::graph::NodeId;
use crate::observability::messages::io::{FrameDecodeFailed, FrameEncodeFailed};
use crate::observability::messages::StructuredLog;
use crate::pulse::Visit;

pub(super) struct IoState {
    target: Weak<StreamInner>,
    codec: Rc<dyn PulseCodec>,
    lines: RefCell<LinesCodec>,
    buffer: RefCell<BytesMut>,
    max_line_length: usize,
}

/// Wraps a stream so it can be driven by raw bytes.
///
/// Bytes written into the adapter are split into lines, decoded into pulses and
/// written into the wrapped stream. Pulses leaving the wrapped stream come back
/// out of the adapter as encoded lines, except those the adapter itself decoded.
#[derive(Clone)]
pub struct IoAdapter {
    stream: Stream,
    target: Stream,
    max_line_length: usize,
}

impl IoAdapter {
    pub fn new(target: &Stream, codec: Rc<dyn PulseCodec>) -> Self {
        Self::with_max_line_length(target, codec, DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(target: &Stream, codec: Rc<dyn PulseCodec>, max_line_length: usize) -> Self {
        let state = IoState {
            target: Rc::downgrade(&target.inner),
            codec,
            lines: RefCell::new(LinesCodec::new_with_max_length(max_line_length)),
            buffer: RefCell::new(BytesMut::new()),
            max_line_length,
        };
        let options = StreamOptions::default().with_high_water_mark(target.high_water_mark());
        let stream = Stream::build(options, Transform::Io(state));
        target.pipe(&stream);

        Self {
            stream,
            target: target.clone(),
            max_line_length,
        }
    }

    pub fn id(&self) -> &NodeId {
        self.stream.id()
    }

    /// The byte-side stream; pipe it into other byte consumers if needed.
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn target(&self) -> &Stream {
        &self.target
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Input queued at or above the high-water mark; hold off writing until it drains.
    pub fn is_saturated(&self) -> bool {
        self.stream.is_saturated()
    }

    /// Feed raw bytes. Partial lines are held until their terminator arrives.
    /// Returns `false` under backpressure.
    pub fn write(&self, bytes: impl Into<Bytes>) -> bool {
        self.stream.write(Chunk::Bytes(bytes.into()))
    }

    /// Next encoded frame, newline included.
    pub fn read(&self) -> Option<Bytes> {
        while let Some(chunk) = self.stream.read() {
            if let Chunk::Bytes(bytes) = chunk {
                return Some(bytes);
            }
        }
        None
    }

    /// Every frame currently available, concatenated.
    pub fn read_all(&self) -> BytesMut {
        let mut out = BytesMut::new();
        while let Some(bytes) = self.read() {
            out.extend_from_slice(&bytes);
        }
        out
    }

    /// Stop receiving pulses from the wrapped stream.
    pub fn close(&self) {
        self.target.unpipe(&self.stream);
        self.stream.destroy();
    }
}

pub(super) fn transform(adapter: &Rc<StreamInner>, state: &IoState, chunk: Chunk) {
    match chunk {
        Chunk::Pulse(pulse) => {
            if pulse.has(&adapter.id) {
                return;
            }
            match state.codec.encode(&pulse) {
                Ok(mut line) => {
                    tracing::trace!(adapter_id = %adapter.id, topic = pulse.topic(), "<--");
                    pulse.tag(&adapter.id, Visit::Seen);
                    line.push('\n');
                    adapter.emit(Chunk::Bytes(Bytes::from(line)));
                }
                Err(err) => FrameEncodeFailed {
                    adapter_id: adapter.id.as_str(),
                    topic: pulse.topic(),
                    error: &err,
                }
                .log(),
            }
        }
        Chunk::Bytes(bytes) => {
            let Some(target) = state.target.upgrade() else {
                return;
            };
            state.buffer.borrow_mut().extend_from_slice(&bytes);

            loop {
                let frame = {
                    let mut buffer = state.buffer.borrow_mut();
                    state.lines.borrow_mut().decode(&mut buffer)
                };
                let line = match frame {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(LinesCodecError::MaxLineLengthExceeded) => {
                        reject(adapter, &target, CodecError::FrameTooLong {
                            max: state.max_line_length,
                        });
                        continue;
                    }
                    Err(LinesCodecError::Io(err)) if err.kind() == ErrorKind::InvalidData => {
                        reject(adapter, &target, CodecError::InvalidUtf8);
                        continue;
                    }
                    Err(LinesCodecError::Io(err)) => {
                        reject(adapter, &target, CodecError::Io(err));
                        break;
                    }
                };

                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match state.codec.decode(line) {
                    Ok(pulse) => {
                        tracing::trace!(adapter_id = %adapter.id, topic = pulse.topic(), "-->");
                        pulse.tag(&adapter.id, Visit::Seen);
                        target.write(Chunk::Pulse(pulse), None);
                    }
                    Err(err) => reject(adapter, &target, err),
                }
            }
        }
    }
}

fn reject(adapter: &Rc<StreamInner>, target: &Rc<StreamInner>, err: CodecError) {
    FrameDecodeFailed {
        adapter_id: adapter.id.as_str(),
        error: &err,
    }
    .log();
    target.send_error(&err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::Pulse;
    use crate::stream::JsonLineCodec;
    use serde_json::json;

    fn wrapped() -> (Stream, IoAdapter, Stream) {
        let target = Stream::new();
        let io = target.io();
        let sink = Stream::new();
        target.pipe(&sink);
        (target, io, sink)
    }

    #[test]
    fn test_partial_lines_are_buffered_across_writes() {
        let (_target, io, sink) = wrapped();

        io.write(Bytes::from_static(br#"{"topic":"gre"#));
        assert_eq!(sink.buffered(), 0);

        io.write(Bytes::from_static(b"et\",\"payload\":[\"hi\"]}\r\n{\"topic\":\"bye\"}\n"));

        let out = sink.read_pulses();
        let topics: Vec<_> = out.iter().map(|p| p.topic().to_string()).collect();
        assert_eq!(topics, vec!["greet", "bye"]);
        assert_eq!(out[0].value(), json!("hi"));
        assert!(out[0].has(io.id()));
    }

    #[test]
    fn test_malformed_line_is_dropped_and_processing_continues() {
        let (target, io, sink) = wrapped();

        io.write(Bytes::from_static(b"garbage\n\n{\"topic\":\"ok\"}\n"));

        let out = sink.read_pulses();
        let topics: Vec<_> = out.iter().map(|p| p.topic().to_string()).collect();
        assert_eq!(topics, vec!["error", "ok"]);
        assert_eq!(out[0].origin(), Some(target.id()));
    }

    #[test]
    fn test_overlong_line_is_rejected() {
        let target = Stream::new();
        let io = IoAdapter::with_max_line_length(&target, Rc::new(JsonLineCodec), 16);
        let sink = Stream::new();
        target.pipe(&sink);

        io.write(Bytes::from(format!("{{\"topic\":\"{}\"}}\n{{\"topic\":\"ok\"}}\n", "x".repeat(64))));

        let topics: Vec<_> = sink.read_pulses().iter().map(|p| p.topic().to_string()).collect();
        assert_eq!(topics, vec!["error", "ok"]);
    }

    #[test]
    fn test_invalid_utf8_line_is_rejected() {
        let (_target, io, sink) = wrapped();

        io.write(Bytes::from_static(b"{\"topic\":\"\xff\xfe\"}\n{\"topic\":\"ok\"}\n"));

        let out = sink.read_pulses();
        let topics: Vec<_> = out.iter().map(|p| p.topic().to_string()).collect();
        assert_eq!(topics, vec!["error", "ok"]);
        assert_eq!(out[0].value()["message"], json!("frame is not valid UTF-8"));
    }

    #[test]
    fn test_outgoing_pulses_are_encoded_once() {
        let target = Stream::new();
        let io = target.io();

        target.feed("out", [json!(1)]);
        io.write(Bytes::from_static(b"{\"topic\":\"in\"}\n"));

        let written = io.read_all();
        assert_eq!(&written[..], b"{\"topic\":\"out\",\"payload\":[1]}\n".as_slice());
    }

    #[test]
    fn test_close_stops_encoding() {
        let target = Stream::new();
        let io = target.io();
        io.close();

        target.write(Pulse::new("late"));
        assert!(io.read().is_none());
        assert_eq!(target.buffered(), 1);
    }
}
