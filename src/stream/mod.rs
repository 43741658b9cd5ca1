// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Once-only stream transform with drain-retry backpressure.
//!
//! A [`Stream`] has a writable buffer (inbox) and a readable buffer (outbox),
//! both bounded by a high-water mark. Every pulse written in is run through the
//! transform exactly once per stream:
//!
//! 1. Non-pulse chunks are a type violation: dropped, reported as an `error` pulse.
//! 2. A pulse this stream has already tagged is dropped silently. This is what
//!    makes rings of streams terminate. The check also runs on `write`, so
//!    echoes coming back around a link never take up buffer space.
//! 3. Otherwise the pulse is tagged and, if the filter passes it, pushed.
//! 4. A push into a full readable buffer defers the chunk. The stream stops
//!    transforming until the readable side drains, then retries the same chunk.
//!    That chunk is the only one a stream ever holds back.
//!
//! Pushing flows the readable buffer synchronously into every piped destination.
//! A destination whose inbox is over the high-water mark pauses the source until
//! it drains, unless the destination is itself waiting (directly or through
//! other paused streams) on the source. Such a pause could never end, so the
//! source keeps flowing and the destination's inbox runs over its mark instead.
//! Writes that arrive while a stream is mid-transform (a ring feeding back into
//! itself) are queued and handled in order once the current chunk is done, so
//! there is no recursion through cycles.
//!
//! `send`, `log` and `error` are not transform output. They go straight onto the
//! readable side, over the high-water mark if need be, and count against it:
//! a stream whose readable side is full stalls its own transform.

mod codec;
mod io;

pub use codec::{JsonLineCodec, PulseCodec};
pub use io::IoAdapter;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::{json, Value};
use tokio_util::bytes::Bytes;

use crate::config::consts::{DEFAULT_HIGH_WATER_MARK, DEFAULT_MAX_FLOWS};
use crate::errors::StreamError;
use crate::graph::{Membership, NodeId};
use crate::observability::messages::stream::{
    BackpressureDeferred, BackpressureResumed, ChunkRejected, PipeLimitExceeded,
};
use crate::observability::messages::StructuredLog;
use crate::pulse::{Pulse, Visit};

/// Unit of data carried between streams.
#[derive(Debug, Clone)]
pub enum Chunk {
    Pulse(Pulse),
    Bytes(Bytes),
}

impl Chunk {
    pub fn kind(&self) -> &'static str {
        match self {
            Chunk::Pulse(_) => "pulse",
            Chunk::Bytes(_) => "bytes",
        }
    }

    pub fn as_pulse(&self) -> Option<&Pulse> {
        match self {
            Chunk::Pulse(pulse) => Some(pulse),
            Chunk::Bytes(_) => None,
        }
    }

    pub fn into_pulse(self) -> Option<Pulse> {
        match self {
            Chunk::Pulse(pulse) => Some(pulse),
            Chunk::Bytes(_) => None,
        }
    }

    fn label(&self) -> String {
        match self {
            Chunk::Pulse(pulse) => pulse.topic().to_string(),
            Chunk::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

impl From<Pulse> for Chunk {
    fn from(pulse: Pulse) -> Self {
        Chunk::Pulse(pulse)
    }
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Chunk::Bytes(bytes)
    }
}

/// Predicate applied to every pulse after it has been tagged.
pub type Filter = Rc<dyn Fn(&Pulse) -> bool>;

/// Data listener. A stream with at least one tap is flowing even without pipes.
pub type Tap = Rc<dyn Fn(&Chunk)>;

/// Log levels, each mapped onto one of the reserved log topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn topic(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Construction options for a stream.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub id: Option<NodeId>,
    pub high_water_mark: usize,
    /// Pipe count above which a warning is logged.
    pub max_flows: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            id: None,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            max_flows: DEFAULT_MAX_FLOWS,
        }
    }
}

impl StreamOptions {
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark.max(1);
        self
    }
}

enum Transform {
    Pulse(Filter),
    Io(io::IoState),
}

enum PushRejected {
    Full(Chunk),
    Fault(StreamError),
}

pub(crate) struct StreamInner {
    id: NodeId,
    high_water_mark: usize,
    max_flows: usize,
    transform: Transform,
    inbox: RefCell<VecDeque<Chunk>>,
    outbox: RefCell<VecDeque<Chunk>>,
    /// The transform's output waiting for drain.
    deferred: RefCell<Option<Chunk>>,
    pipes: RefCell<Vec<Weak<StreamInner>>>,
    taps: RefCell<Vec<(usize, Tap)>>,
    next_tap: Cell<usize>,
    /// Upstream writers paused on this stream's inbox.
    drain_waiters: RefCell<Vec<Weak<StreamInner>>>,
    needs_drain: Cell<bool>,
    /// Destinations this stream is paused on.
    waiting_on: RefCell<Vec<Weak<StreamInner>>>,
    busy: Cell<bool>,
    flowing: Cell<bool>,
    destroyed: Cell<bool>,
    parent: Membership,
}

/// A composable, once-only pulse transform. Cloning shares the same stream.
#[derive(Clone)]
pub struct Stream {
    inner: Rc<StreamInner>,
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream {
    /// Pass-through stream with default options.
    pub fn new() -> Self {
        Self::with_options(StreamOptions::default(), |_: &Pulse| true)
    }

    pub fn with_filter<F>(filter: F) -> Self
    where
        F: Fn(&Pulse) -> bool + 'static,
    {
        Self::with_options(StreamOptions::default(), filter)
    }

    pub fn with_options<F>(options: StreamOptions, filter: F) -> Self
    where
        F: Fn(&Pulse) -> bool + 'static,
    {
        Self::build(options, Transform::Pulse(Rc::new(filter)))
    }

    fn build(options: StreamOptions, transform: Transform) -> Self {
        Self {
            inner: Rc::new(StreamInner {
                id: options.id.unwrap_or_else(NodeId::generate),
                high_water_mark: options.high_water_mark.max(1),
                max_flows: options.max_flows,
                transform,
                inbox: RefCell::new(VecDeque::new()),
                outbox: RefCell::new(VecDeque::new()),
                deferred: RefCell::new(None),
                pipes: RefCell::new(Vec::new()),
                taps: RefCell::new(Vec::new()),
                next_tap: Cell::new(0),
                drain_waiters: RefCell::new(Vec::new()),
                needs_drain: Cell::new(false),
                waiting_on: RefCell::new(Vec::new()),
                busy: Cell::new(false),
                flowing: Cell::new(false),
                destroyed: Cell::new(false),
                parent: Membership::default(),
            }),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.inner.id
    }

    pub fn high_water_mark(&self) -> usize {
        self.inner.high_water_mark
    }

    /// Write a chunk into the stream.
    ///
    /// Returns `false` when the inbox is at or above the high-water mark; the
    /// chunk is still buffered, the caller should hold off until drain.
    pub fn write(&self, chunk: impl Into<Chunk>) -> bool {
        self.inner.write(chunk.into(), None)
    }

    /// Take the oldest chunk off the readable side. Frees room for a deferred push.
    pub fn read(&self) -> Option<Chunk> {
        let chunk = self.inner.outbox.borrow_mut().pop_front();
        if chunk.is_some() {
            self.inner.retry_deferred();
        }
        chunk
    }

    /// Read every pulse currently available, skipping byte chunks.
    pub fn read_pulses(&self) -> Vec<Pulse> {
        std::iter::from_fn(|| self.read())
            .filter_map(Chunk::into_pulse)
            .collect()
    }

    /// Pipe this stream's output into `dest`. Returns `dest` for chaining.
    pub fn pipe<'a>(&self, dest: &'a Stream) -> &'a Stream {
        {
            let mut pipes = self.inner.pipes.borrow_mut();
            pipes.retain(|p| p.strong_count() > 0);
            if !pipes.iter().any(|p| p.as_ptr() == Rc::as_ptr(&dest.inner)) {
                pipes.push(Rc::downgrade(&dest.inner));
            }
            if pipes.len() > self.inner.max_flows {
                PipeLimitExceeded {
                    stream_id: self.inner.id.as_str(),
                    pipes: pipes.len(),
                    max_flows: self.inner.max_flows,
                }
                .log();
            }
        }
        self.inner.flow();
        dest
    }

    pub fn unpipe(&self, dest: &Stream) -> &Self {
        self.inner
            .pipes
            .borrow_mut()
            .retain(|p| p.strong_count() > 0 && p.as_ptr() != Rc::as_ptr(&dest.inner));

        dest.inner
            .drain_waiters
            .borrow_mut()
            .retain(|w| w.as_ptr() != Rc::as_ptr(&self.inner));
        if self.inner.stop_waiting(&dest.inner) {
            self.inner.flow();
        }
        self
    }

    pub fn is_piped_to(&self, dest: &Stream) -> bool {
        self.inner
            .pipes
            .borrow()
            .iter()
            .any(|p| p.as_ptr() == Rc::as_ptr(&dest.inner))
    }

    pub fn pipe_count(&self) -> usize {
        self.inner
            .pipes
            .borrow()
            .iter()
            .filter(|p| p.strong_count() > 0)
            .count()
    }

    /// Bidirectional pipe. Safe in the presence of cycles because every stream
    /// handles a given pulse at most once.
    pub fn link(&self, other: &Stream) -> &Self {
        self.pipe(other);
        other.pipe(self);
        self
    }

    pub fn unlink(&self, other: &Stream) -> &Self {
        self.unpipe(other);
        other.unpipe(self);
        self
    }

    /// Pipe `self → flows[0] → … → flows[n-1] → self`.
    ///
    /// The collective output of the chained streams comes back in as input of
    /// every member, including this one.
    pub fn chain(&self, flows: &[Stream]) -> &Self {
        let tail = flows.iter().fold(self, |prev, next| prev.pipe(next));
        tail.pipe(self);
        self
    }

    /// Register a data listener. Returns a handle for [`Stream::untap`].
    pub fn tap<F>(&self, listener: F) -> usize
    where
        F: Fn(&Chunk) + 'static,
    {
        let handle = self.inner.next_tap.get();
        self.inner.next_tap.set(handle + 1);
        self.inner.taps.borrow_mut().push((handle, Rc::new(listener)));
        self.inner.flow();
        handle
    }

    pub fn untap(&self, handle: usize) -> bool {
        let mut taps = self.inner.taps.borrow_mut();
        let before = taps.len();
        taps.retain(|(h, _)| *h != handle);
        before != taps.len()
    }

    /// Write a fresh pulse into this stream.
    pub fn feed<I>(&self, topic: impl Into<String>, values: I) -> &Self
    where
        I: IntoIterator<Item = Value>,
    {
        let pulse = Pulse::new(topic);
        pulse.extend(values);
        self.write(pulse);
        self
    }

    /// Push a fresh pulse, originating from this stream, onto the readable side.
    pub fn send<I>(&self, topic: impl Into<String>, values: I) -> &Self
    where
        I: IntoIterator<Item = Value>,
    {
        let pulse = Pulse::with_origin(topic, self.inner.id.clone());
        pulse.extend(values);
        self.inner.enqueue(Chunk::Pulse(pulse));
        self
    }

    /// Send a log pulse.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> &Self {
        self.send(level.topic(), [Value::String(message.into())])
    }

    /// Send a self-describing `error` pulse for `err`.
    pub fn error(&self, err: &dyn std::error::Error) -> &Self {
        self.inner.send_error(err);
        self
    }

    pub fn seen(&self, pulse: &Pulse) -> bool {
        pulse.has(&self.inner.id)
    }

    pub fn mark(&self, pulse: &Pulse, status: Visit) {
        pulse.tag(&self.inner.id, status);
    }

    /// Chunks waiting on the readable side.
    pub fn buffered(&self) -> usize {
        self.inner.outbox.borrow().len()
    }

    /// Chunks written but not yet transformed.
    pub fn pending(&self) -> usize {
        self.inner.inbox.borrow().len()
    }

    /// True while a push is deferred waiting for drain.
    pub fn is_stalled(&self) -> bool {
        self.inner.deferred.borrow().is_some()
    }

    /// True while paused on one or more destinations.
    pub fn is_paused(&self) -> bool {
        self.inner.paused()
    }

    /// Inbox at or above the high-water mark; writers should hold off.
    pub fn is_saturated(&self) -> bool {
        self.pending() >= self.inner.high_water_mark
    }

    pub fn max_flows(&self) -> usize {
        self.inner.max_flows
    }

    /// Drop everything buffered: written, readable and deferred.
    pub fn discard(&self) {
        self.inner.inbox.borrow_mut().clear();
        self.inner.outbox.borrow_mut().clear();
        self.inner.deferred.borrow_mut().take();
        self.inner.notify_drain();
    }

    pub fn inspect(&self) -> Value {
        json!({
            "id": self.inner.id,
            "pending": self.pending(),
            "buffered": self.buffered(),
            "stalled": self.is_stalled(),
            "paused": self.is_paused(),
            "pipes": self.pipe_count(),
        })
    }

    /// Discard buffers and stop accepting writes and pushes.
    pub fn destroy(&self) {
        self.inner.destroyed.set(true);
        self.inner.pipes.borrow_mut().clear();
        self.discard();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Wrap this stream with a newline-delimited byte adapter using the JSON line codec.
    pub fn io(&self) -> IoAdapter {
        self.io_with(JsonLineCodec)
    }

    /// Wrap this stream with a newline-delimited byte adapter using `codec`.
    pub fn io_with<C>(&self, codec: C) -> IoAdapter
    where
        C: PulseCodec + 'static,
    {
        IoAdapter::new(self, Rc::new(codec))
    }

    pub(crate) fn membership(&self) -> &Membership {
        &self.inner.parent
    }

    /// Same stream (not merely equal ID).
    pub fn same(&self, other: &Stream) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.id)
            .field("pending", &self.pending())
            .field("buffered", &self.buffered())
            .field("stalled", &self.is_stalled())
            .field("pipes", &self.pipe_count())
            .finish()
    }
}

impl StreamInner {
    fn write(self: &Rc<Self>, chunk: Chunk, writer: Option<&Rc<StreamInner>>) -> bool {
        if self.destroyed.get() {
            let err = StreamError::Destroyed {
                stream: self.id.clone(),
            };
            ChunkRejected {
                stream_id: self.id.as_str(),
                error: &err,
            }
            .log();
            return false;
        }

        if let Chunk::Pulse(pulse) = &chunk {
            if pulse.has(&self.id) {
                tracing::trace!(stream_id = %self.id, topic = pulse.topic(), "already seen, dropping");
                return true;
            }
        }

        self.inbox.borrow_mut().push_back(chunk);
        self.process();

        let open = self.inbox.borrow().len() < self.high_water_mark;
        if !open {
            self.needs_drain.set(true);
            if let Some(writer) = writer {
                self.pause(writer);
            }
        }
        open
    }

    /// Make `writer` wait for this stream to drain, unless this stream is
    /// already waiting on `writer`.
    fn pause(self: &Rc<Self>, writer: &Rc<StreamInner>) {
        if self.waits_on(writer) {
            tracing::trace!(stream_id = %self.id, writer_id = %writer.id, "writer is in this stream's wait chain, not pausing");
            return;
        }
        let already = writer
            .waiting_on
            .borrow()
            .iter()
            .any(|w| w.as_ptr() == Rc::as_ptr(self));
        if already {
            return;
        }
        writer.waiting_on.borrow_mut().push(Rc::downgrade(self));
        self.drain_waiters.borrow_mut().push(Rc::downgrade(writer));
    }

    /// True if `target` is this stream or anything this stream is transitively paused on.
    fn waits_on(self: &Rc<Self>, target: &Rc<StreamInner>) -> bool {
        let mut stack = vec![Rc::clone(self)];
        let mut visited: Vec<*const StreamInner> = Vec::new();
        while let Some(stream) = stack.pop() {
            if Rc::ptr_eq(&stream, target) {
                return true;
            }
            if visited.contains(&Rc::as_ptr(&stream)) {
                continue;
            }
            visited.push(Rc::as_ptr(&stream));
            stack.extend(stream.waiting_on.borrow().iter().filter_map(Weak::upgrade));
        }
        false
    }

    fn paused(&self) -> bool {
        let mut waiting_on = self.waiting_on.borrow_mut();
        waiting_on.retain(|w| w.strong_count() > 0);
        !waiting_on.is_empty()
    }

    /// Forget a pause on `dest`. True if that left the stream unpaused.
    fn stop_waiting(&self, dest: &StreamInner) -> bool {
        let mut waiting_on = self.waiting_on.borrow_mut();
        let before = waiting_on.len();
        waiting_on.retain(|w| w.strong_count() > 0 && w.as_ptr() != dest as *const StreamInner);
        before != waiting_on.len() && waiting_on.is_empty()
    }

    /// Transform queued chunks until the inbox is empty or a push is deferred.
    fn process(self: &Rc<Self>) {
        if self.busy.get() {
            return;
        }
        self.busy.set(true);
        loop {
            if self.deferred.borrow().is_some() {
                break;
            }
            let next = self.inbox.borrow_mut().pop_front();
            let Some(chunk) = next else { break };
            self.transform(chunk);
        }
        self.busy.set(false);
        self.notify_drain();
    }

    fn transform(self: &Rc<Self>, chunk: Chunk) {
        match &self.transform {
            Transform::Pulse(filter) => {
                let pulse = match chunk {
                    Chunk::Pulse(pulse) => pulse,
                    other => {
                        let err = StreamError::IncompatibleChunk {
                            stream: self.id.clone(),
                            found: other.kind(),
                        };
                        ChunkRejected {
                            stream_id: self.id.as_str(),
                            error: &err,
                        }
                        .log();
                        self.send_error(&err);
                        return;
                    }
                };

                if pulse.has(&self.id) {
                    tracing::trace!(stream_id = %self.id, topic = pulse.topic(), "already seen, dropping");
                    return;
                }
                pulse.tag(&self.id, Visit::Seen);

                let filter = Rc::clone(filter);
                if filter(&pulse) {
                    self.emit(Chunk::Pulse(pulse));
                }
            }
            Transform::Io(state) => io::transform(self, state, chunk),
        }
    }

    /// Push transform output, deferring on backpressure and escalating anything else.
    fn emit(self: &Rc<Self>, chunk: Chunk) {
        match self.push(chunk) {
            Ok(()) => {}
            Err(PushRejected::Full(chunk)) => {
                BackpressureDeferred {
                    stream_id: self.id.as_str(),
                    topic: &chunk.label(),
                    buffered: self.outbox.borrow().len(),
                }
                .log();
                *self.deferred.borrow_mut() = Some(chunk);
            }
            Err(PushRejected::Fault(err)) => {
                ChunkRejected {
                    stream_id: self.id.as_str(),
                    error: &err,
                }
                .log();
            }
        }
    }

    fn push(self: &Rc<Self>, chunk: Chunk) -> Result<(), PushRejected> {
        if self.destroyed.get() {
            return Err(PushRejected::Fault(StreamError::Destroyed {
                stream: self.id.clone(),
            }));
        }
        if self.outbox.borrow().len() >= self.high_water_mark {
            return Err(PushRejected::Full(chunk));
        }
        self.outbox.borrow_mut().push_back(chunk);
        self.flow();
        Ok(())
    }

    /// Put a generated chunk on the readable side, full or not.
    fn enqueue(self: &Rc<Self>, chunk: Chunk) {
        if self.destroyed.get() {
            let err = StreamError::Destroyed {
                stream: self.id.clone(),
            };
            ChunkRejected {
                stream_id: self.id.as_str(),
                error: &err,
            }
            .log();
            return;
        }
        let buffered = {
            let mut outbox = self.outbox.borrow_mut();
            outbox.push_back(chunk);
            outbox.len()
        };
        if buffered > self.high_water_mark {
            tracing::debug!(stream_id = %self.id, buffered, "readable side over high-water mark");
        }
        self.flow();
    }

    fn has_consumers(&self) -> bool {
        !self.taps.borrow().is_empty() || self.pipes.borrow().iter().any(|p| p.strong_count() > 0)
    }

    /// Move readable chunks into taps and destinations until paused or empty.
    fn flow(self: &Rc<Self>) {
        if self.flowing.get() {
            return;
        }
        self.flowing.set(true);
        while !self.paused() && self.has_consumers() {
            let next = self.outbox.borrow_mut().pop_front();
            let Some(chunk) = next else { break };
            self.deliver(&chunk);
        }
        self.flowing.set(false);
        self.retry_deferred();
    }

    fn deliver(self: &Rc<Self>, chunk: &Chunk) {
        let taps: Vec<Tap> = self.taps.borrow().iter().map(|(_, t)| Rc::clone(t)).collect();
        for tap in taps {
            tap(chunk);
        }

        let pipes: Vec<Rc<StreamInner>> = self.pipes.borrow().iter().filter_map(Weak::upgrade).collect();
        for dest in pipes {
            dest.write(chunk.clone(), Some(self));
        }
    }

    /// Drain notification: retry the deferred chunk, then resume transforming.
    fn retry_deferred(self: &Rc<Self>) {
        if self.outbox.borrow().len() >= self.high_water_mark {
            return;
        }
        let next = self.deferred.borrow_mut().take();
        let Some(chunk) = next else { return };

        BackpressureResumed {
            stream_id: self.id.as_str(),
            topic: &chunk.label(),
        }
        .log();

        match self.push(chunk) {
            Ok(()) => {}
            Err(PushRejected::Full(chunk)) => {
                *self.deferred.borrow_mut() = Some(chunk);
                return;
            }
            Err(PushRejected::Fault(err)) => {
                ChunkRejected {
                    stream_id: self.id.as_str(),
                    error: &err,
                }
                .log();
            }
        }
        self.process();
    }

    fn notify_drain(&self) {
        if !self.needs_drain.get() || self.inbox.borrow().len() >= self.high_water_mark {
            return;
        }
        self.needs_drain.set(false);
        let waiters = std::mem::take(&mut *self.drain_waiters.borrow_mut());
        for waiter in waiters.iter().filter_map(Weak::upgrade) {
            if waiter.stop_waiting(self) {
                waiter.flow();
            }
        }
    }

    fn send_error(self: &Rc<Self>, err: &dyn std::error::Error) {
        let pulse = Pulse::with_origin("error", self.id.clone());
        pulse.add(json!({
            "message": err.to_string(),
            "origin": self.id.as_str(),
        }));
        self.enqueue(Chunk::Pulse(pulse));
    }
}
