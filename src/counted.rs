//! Counted Connection: raw I/O call accounting for one connection.
//!
//! Every completed poll of the wrapped stream, successful or not, bumps the
//! matching raw counter exactly once. A `Pending` poll has not completed an
//! I/O call and is not counted. The counters measure call volume, which is
//! independent from the number of framed messages carried.

use crate::report::RunReport;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// The four counters of one connection
///
/// The send loop owns `send` and `write`, the receive loop owns `recv` and
/// `read`. Atomics give the aggregating reader visibility; no two writers
/// ever share a counter.
#[derive(Debug, Default)]
pub struct ConnCounters {
    send: AtomicU32,
    recv: AtomicU32,
    read: AtomicU32,
    write: AtomicU32,
}

impl ConnCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_send(&self) {
        self.send.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recv(&self) {
        self.recv.fetch_add(1, Ordering::Relaxed);
    }

    fn record_read(&self) {
        self.read.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.write.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all four counters into a report.
    pub fn snapshot(&self) -> RunReport {
        RunReport {
            send_count: self.send.load(Ordering::Acquire),
            recv_count: self.recv.load(Ordering::Acquire),
            read_count: self.read.load(Ordering::Acquire),
            write_count: self.write.load(Ordering::Acquire),
        }
    }
}

/// Stream wrapper counting raw reads and writes into shared [`ConnCounters`]
///
/// Wrap each half of a split connection separately; both halves point at the
/// same counters.
#[derive(Debug)]
pub struct Counted<S> {
    inner: S,
    counters: Arc<ConnCounters>,
}

impl<S> Counted<S> {
    pub fn new(inner: S, counters: Arc<ConnCounters>) -> Self {
        Self { inner, counters }
    }

    pub fn counters(&self) -> &Arc<ConnCounters> {
        &self.counters
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Counted<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if poll.is_ready() {
            this.counters.record_read();
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Counted<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if poll.is_ready() {
            this.counters.record_write();
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
