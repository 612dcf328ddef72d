//! # Client Worker
//!
//! One worker drives the duplex traffic of one connection. It runs two
//! independently scheduled loops: a send loop and a receive loop. Both
//! announce readiness on the start barrier, wait for the release, and then
//! run flat out until their first I/O error.
//!
//! There is no cancellation token. The coordinator ends a run by shutting
//! the socket down underneath the loops; the resulting I/O error is the
//! termination signal. Whether the error is logged depends only on whether
//! the run deadline had already passed.

use crate::counted::{ConnCounters, Counted};
use crate::framing::{FrameError, FrameReader, FrameWriter, Message};
use crate::gate::GateHandle;
use crate::report::RunReport;
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::net::Shutdown;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

/// Which half of a worker a loop drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Send,
    Receive,
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopKind::Send => write!(f, "send"),
            LoopKind::Receive => write!(f, "recv"),
        }
    }
}

/// A dialed connection that has not started its loops yet
pub struct ClientWorker {
    id: usize,
    stream: TcpStream,
    closer: socket2::Socket,
    counters: Arc<ConnCounters>,
}

impl ClientWorker {
    /// Dial `addr`, giving up after `dial_timeout`.
    ///
    /// Failure here is a setup failure and the caller is expected to abort
    /// the whole run.
    ///
    /// Each connection holds two file descriptors: the stream and a dup'd
    /// handle used to force it closed. Size `ulimit -n` to at least twice the
    /// connection count of one process.
    pub async fn connect(id: usize, addr: &str, dial_timeout: Duration) -> Result<Self> {
        let stream = timeout(dial_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| anyhow!("Timed out connecting to {} after {:?}", addr, dial_timeout))?
            .with_context(|| format!("Failed to connect to {}", addr))?;

        // Keep a second handle on the socket so the coordinator can shut it
        // down while both loops own their halves of the stream.
        let std_stream = stream.into_std()?;
        let closer = socket2::Socket::from(std_stream.try_clone()?);
        closer.set_nodelay(true)?;
        let stream = TcpStream::from_std(std_stream)?;

        debug!("Connection {} established to {}", id, addr);
        Ok(Self {
            id,
            stream,
            closer,
            counters: ConnCounters::new(),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Spawn the send and receive loops. They park on `gate` until released.
    pub fn start(self, gate: &GateHandle, message: Message) -> WorkerHandle {
        let (read_half, write_half) = self.stream.into_split();
        let loops = spawn_loops(
            self.id,
            read_half,
            write_half,
            self.counters.clone(),
            gate,
            message,
        );

        WorkerHandle {
            id: self.id,
            counters: self.counters,
            closer: Some(self.closer),
            loops,
        }
    }
}

/// A running worker as seen by the coordinator
pub struct WorkerHandle {
    id: usize,
    counters: Arc<ConnCounters>,
    closer: Option<socket2::Socket>,
    loops: WorkerLoops,
}

impl WorkerHandle {
    /// Shut the connection down in both directions.
    ///
    /// Both loops are blocked on this socket, so they observe an I/O error
    /// and exit. Calling this more than once is harmless.
    pub fn close(&mut self) {
        if let Some(socket) = self.closer.take() {
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                debug!("Connection {} shutdown returned: {}", self.id, e);
            }
        }
    }

    /// Wait for both loops to exit, then read this connection's counters.
    pub async fn join_until(self, deadline: Instant) -> RunReport {
        self.loops.join_until(self.id, deadline).await;
        self.counters.snapshot()
    }
}

/// The two loop tasks of a worker
pub struct WorkerLoops {
    send: JoinHandle<()>,
    recv: JoinHandle<()>,
}

impl WorkerLoops {
    /// Join both loops, aborting any that is still running at `deadline`.
    ///
    /// Returns `true` when both loops exited on their own.
    pub async fn join_until(self, id: usize, deadline: Instant) -> bool {
        let send_done = join_loop(id, LoopKind::Send, self.send, deadline).await;
        let recv_done = join_loop(id, LoopKind::Receive, self.recv, deadline).await;
        send_done && recv_done
    }
}

async fn join_loop(id: usize, kind: LoopKind, mut task: JoinHandle<()>, deadline: Instant) -> bool {
    match timeout_at(deadline, &mut task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("Connection {} {} loop ended abnormally: {}", id, kind, e);
            true
        }
        Err(_) => {
            warn!(
                "Connection {} {} loop still running after close, aborting",
                id, kind
            );
            task.abort();
            false
        }
    }
}

/// Spawn the send and receive loops over an already split stream.
pub fn spawn_loops<R, W>(
    id: usize,
    reader: R,
    writer: W,
    counters: Arc<ConnCounters>,
    gate: &GateHandle,
    message: Message,
) -> WorkerLoops
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = FrameWriter::new(Counted::new(writer, counters.clone()));
    let reader = FrameReader::new(Counted::new(reader, counters));

    WorkerLoops {
        send: tokio::spawn(send_loop(id, writer, gate.clone(), message)),
        recv: tokio::spawn(recv_loop(id, reader, gate.clone())),
    }
}

async fn send_loop<W>(id: usize, mut writer: FrameWriter<Counted<W>>, gate: GateHandle, message: Message)
where
    W: AsyncWrite + Unpin,
{
    let deadline = match gate.arrive_and_wait().await {
        Some(deadline) => deadline,
        None => {
            debug!("Connection {} send loop never released", id);
            return;
        }
    };

    let counters = writer.get_ref().counters().clone();
    loop {
        if let Err(e) = writer.send(message.as_bytes()).await {
            log_loop_exit(id, LoopKind::Send, &e, deadline);
            break;
        }
        counters.record_send();
    }
}

async fn recv_loop<R>(id: usize, mut reader: FrameReader<Counted<R>>, gate: GateHandle)
where
    R: AsyncRead + Unpin,
{
    let deadline = match gate.arrive_and_wait().await {
        Some(deadline) => deadline,
        None => {
            debug!("Connection {} recv loop never released", id);
            return;
        }
    };

    let counters = reader.get_ref().counters().clone();
    loop {
        if let Err(e) = reader.receive().await {
            log_loop_exit(id, LoopKind::Receive, &e, deadline);
            break;
        }
        counters.record_recv();
    }
}

/// Errors after the deadline are how loops normally stop.
fn exit_is_expected(deadline: Instant, now: Instant) -> bool {
    now >= deadline
}

fn log_loop_exit(id: usize, kind: LoopKind, error: &FrameError, deadline: Instant) {
    if exit_is_expected(deadline, Instant::now()) {
        debug!("Connection {} {} loop stopped: {}", id, kind, error);
    } else {
        warn!("Connection {} {} error: {}", id, kind, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::StartGate;

    /// Loop a duplex stream back on itself, like an echo server would.
    fn spawn_echo(server: tokio::io::DuplexStream) -> JoinHandle<()> {
        tokio::spawn(async move {
            let (mut r, mut w) = tokio::io::split(server);
            let _ = tokio::io::copy(&mut r, &mut w).await;
        })
    }

    #[tokio::test]
    async fn test_loops_count_until_peer_goes_away() {
        let (client, server) = tokio::io::duplex(16 * 1024);
        let echo = spawn_echo(server);
        let (reader, writer) = tokio::io::split(client);

        let gate = StartGate::new();
        let counters = ConnCounters::new();
        let loops = spawn_loops(
            0,
            reader,
            writer,
            counters.clone(),
            &gate.handle(),
            Message::zeroed(16),
        );

        gate.wait_ready(2).await.unwrap();
        gate.release(Instant::now());
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Dropping the far side is the forced close for an in-memory stream.
        echo.abort();
        assert!(loops.join_until(0, Instant::now() + Duration::from_secs(2)).await);

        let report = counters.snapshot();
        assert!(report.send_count > 0);
        assert!(report.recv_count > 0);
        assert!(report.recv_count <= report.send_count);
        assert!(report.read_count >= report.recv_count);
        assert!(report.write_count >= report.send_count);
    }

    #[tokio::test]
    async fn test_no_traffic_without_release() {
        let (client, server) = tokio::io::duplex(1024);
        let _echo = spawn_echo(server);
        let (reader, writer) = tokio::io::split(client);

        let gate = StartGate::new();
        let counters = ConnCounters::new();
        let loops = spawn_loops(
            3,
            reader,
            writer,
            counters.clone(),
            &gate.handle(),
            Message::zeroed(8),
        );

        gate.wait_ready(2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counters.snapshot(), RunReport::default());

        drop(gate);
        assert!(loops.join_until(3, Instant::now() + Duration::from_secs(1)).await);
        assert_eq!(counters.snapshot(), RunReport::default());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = ClientWorker::connect(0, &addr, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_exit_before_deadline_is_unexpected() {
        let now = Instant::now();
        let deadline = now + Duration::from_millis(100);

        assert!(!exit_is_expected(deadline, now));
        assert!(exit_is_expected(deadline, deadline));
        assert!(exit_is_expected(deadline, deadline + Duration::from_millis(1)));
    }

    #[tokio::test]
    async fn test_close_unblocks_tcp_loops() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        // Accept and hold the connection without echoing anything back.
        let server = tokio::spawn(async move { listener.accept().await.map(|(s, _)| s) });

        let worker = ClientWorker::connect(7, &addr, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(worker.id(), 7);
        let _peer = server.await.unwrap().unwrap();

        let gate = StartGate::new();
        let mut handle = worker.start(&gate.handle(), Message::zeroed(32));
        gate.wait_ready(2).await.unwrap();
        gate.release(Instant::now());
        tokio::time::sleep(Duration::from_millis(50)).await;

        handle.close();
        handle.close();
        let report = handle
            .join_until(Instant::now() + Duration::from_secs(2))
            .await;
        assert!(report.send_count > 0);
        assert_eq!(report.recv_count, 0);
    }
}
