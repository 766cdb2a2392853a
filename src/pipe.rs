//! Bounded single-producer/single-consumer byte handoff.
//!
//! The pump writes encoded chunks into a [`PipeWriter`]; the caller drains
//! them from the matching [`BodyStream`]. The channel is bounded, so a slow
//! consumer suspends the producer instead of growing an in-memory buffer.
//! The write end closes either cleanly (drop) or with a single terminal
//! [`BuildError`] that the read end surfaces exactly once.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use crate::error::BuildError;

/// Chunks buffered between producer and consumer before the producer
/// suspends. Small on purpose: backpressure, not buffering, is the point.
const PIPE_CHUNK_CAPACITY: usize = 8;

pub(crate) fn pipe() -> (PipeWriter, BodyStream) {
    let (tx, rx) = mpsc::channel(PIPE_CHUNK_CAPACITY);
    (
        PipeWriter { tx },
        BodyStream {
            rx,
            current: Bytes::new(),
            done: false,
        },
    )
}

/// Write end of the pipe. Held by the pump, dropped exactly once.
pub(crate) struct PipeWriter {
    tx: mpsc::Sender<Result<Bytes, BuildError>>,
}

impl PipeWriter {
    /// Sends one chunk, suspending while the channel is full.
    ///
    /// A closed read end surfaces as `BrokenPipe`, which the pump treats as
    /// "consumer gone, stop producing".
    pub(crate) async fn write(&self, chunk: Bytes) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx.send(Ok(chunk)).await.map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "multipart body reader dropped")
        })
    }

    /// Closes the write end with a terminal error.
    ///
    /// Best effort: if the consumer has already gone away there is nobody
    /// left to deliver to, and the error is logged instead.
    pub(crate) async fn fail(self, error: BuildError) {
        if let Err(mpsc::error::SendError(Err(error))) = self.tx.send(Err(error)).await {
            tracing::debug!(%error, "multipart body reader dropped before error delivery");
        }
    }
}

/// Read end of a multipart body under production.
///
/// Yields encoded bytes in write order, ending with either end-of-stream
/// (production succeeded) or a single [`BuildError`] (production stopped at
/// the first failing operation). The same bytes are available through the
/// [`Stream`] and [`AsyncRead`] interfaces; mixing the two is supported.
///
/// The body is single-pass and forward-only. Dropping it (or calling
/// [`close`](Self::close)) terminates the producer at its next write.
pub struct BodyStream {
    rx: mpsc::Receiver<Result<Bytes, BuildError>>,
    /// Remainder of a chunk partially consumed through `AsyncRead`.
    current: Bytes,
    done: bool,
}

impl BodyStream {
    /// Stops accepting further chunks from the producer.
    ///
    /// Idempotent. Chunks already buffered (and a pending terminal error)
    /// remain readable; the producer's next write fails and terminates it.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl std::fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyStream")
            .field("buffered", &self.current.len())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, BuildError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if !this.current.is_empty() {
            return Poll::Ready(Some(Ok(std::mem::take(&mut this.current))));
        }
        if this.done {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(error))) => {
                this.done = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl AsyncRead for BodyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.current.is_empty() {
                let n = this.current.len().min(buf.remaining());
                buf.put_slice(&this.current.split_to(n));
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.current = chunk,
                Poll::Ready(Some(Err(error))) => {
                    this.done = true;
                    return Poll::Ready(Err(io::Error::other(error)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(Ok(()));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
