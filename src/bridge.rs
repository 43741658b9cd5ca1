// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Async pump between a byte transport and an [`IoAdapter`].
//!
//! The graph is single-threaded and synchronous, so the bridge must run on a
//! current-thread runtime (or inside a `LocalSet`). Every read from the
//! transport is handed to the adapter whole; whatever the graph produced in
//! response is flushed to the writer before the next read. If the adapter
//! reports backpressure, the next read waits until its input side drains.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::bytes::BytesMut;
use tracing::Instrument;

use crate::observability::messages::io::{BridgeClosed, BridgeOpened};
use crate::observability::messages::StructuredLog;
use crate::stream::IoAdapter;

const READ_CHUNK: usize = 8 * 1024;

/// Byte counts for a finished bridge session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeSummary {
    pub bytes_in: usize,
    pub bytes_out: usize,
}

/// Pump `reader` into `adapter` and adapter output into `writer` until
/// `reader` reaches end of input.
pub async fn serve<R, W>(adapter: &IoAdapter, reader: R, writer: W) -> std::io::Result<BridgeSummary>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let start_msg = BridgeOpened {
        adapter_id: adapter.id().as_str(),
        max_line_length: adapter.max_line_length(),
    };
    let span = start_msg.span("bridge_session");
    span.in_scope(|| start_msg.log());

    let summary = pump(adapter, reader, writer).instrument(span.clone()).await?;

    span.in_scope(|| {
        BridgeClosed {
            adapter_id: adapter.id().as_str(),
            bytes_in: summary.bytes_in,
            bytes_out: summary.bytes_out,
        }
        .log()
    });
    Ok(summary)
}

async fn pump<R, W>(adapter: &IoAdapter, mut reader: R, mut writer: W) -> std::io::Result<BridgeSummary>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = BridgeSummary::default();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    summary.bytes_out += flush(adapter, &mut writer).await?;
    loop {
        buf.reserve(READ_CHUNK);
        let read = reader.read_buf(&mut buf).await?;
        if read == 0 {
            break;
        }
        summary.bytes_in += read;
        tracing::trace!(adapter_id = %adapter.id(), bytes = read, "bridge read");

        let accepted = adapter.write(buf.split().freeze());
        summary.bytes_out += flush(adapter, &mut writer).await?;
        if !accepted {
            tracing::debug!(adapter_id = %adapter.id(), "adapter saturated, draining before next read");
            while adapter.is_saturated() {
                let written = flush(adapter, &mut writer).await?;
                if written == 0 {
                    break;
                }
                summary.bytes_out += written;
            }
        }
    }
    writer.shutdown().await?;
    Ok(summary)
}

async fn flush<W>(adapter: &IoAdapter, writer: &mut W) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    loop {
        // reading frees room, which can let the graph produce more
        let pending = adapter.read_all();
        if pending.is_empty() {
            break;
        }
        writer.write_all(&pending).await?;
        written += pending.len();
    }
    if written > 0 {
        writer.flush().await?;
    }
    Ok(written)
}
