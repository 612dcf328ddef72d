//! # Benchmark Coordinator
//!
//! Runs one local benchmark across N connections and produces one
//! [`RunReport`].
//!
//! ## Run Lifecycle
//!
//! 1. **Dial**: establish every connection; any failure aborts the run
//! 2. **Barrier**: wait until all 2N loops (send + receive per connection)
//!    are parked on the start gate
//! 3. **Release**: fire the gate once, carrying the run deadline
//! 4. **Run**: sleep until the deadline
//! 5. **Close**: shut every connection down; the I/O errors this causes are
//!    what stops the loops
//! 6. **Aggregate**: join the loops and sum their counters
//!
//! No connection starts measured traffic while another is still being
//! dialed, so early connections get no head start.

use crate::{
    cli::BenchmarkConfig,
    framing::Message,
    gate::StartGate,
    report::RunReport,
    utils,
    worker::{ClientWorker, WorkerHandle},
};
use anyhow::{Context, Result};
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

/// A helper struct to provide a consistent, single source of truth for displaying
/// the per-process run configuration.
struct RunConfigDisplay<'a> {
    config: &'a BenchmarkConfig,
}

impl<'a> fmt::Display for RunConfigDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Starting Benchmark against: {}", self.config.server_addr)?;
        writeln!(f, "  Connections:        {}", self.config.connections)?;
        writeln!(
            f,
            "  Message Size:       {}",
            utils::format_bytes(self.config.message_size)
        )?;
        writeln!(f, "  Test Duration:      {:?}", self.config.duration)?;
        writeln!(f, "  Dial Timeout:       {:?}", self.config.dial_timeout)?;
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// Orchestrates exactly one in-process run
pub struct Coordinator {
    config: BenchmarkConfig,
    close_grace: Duration,
}

impl Coordinator {
    pub fn new(config: BenchmarkConfig) -> Self {
        Self {
            config,
            close_grace: crate::defaults::CLOSE_GRACE,
        }
    }

    /// Override how long loops get to exit after their connections are closed.
    pub fn with_close_grace(mut self, close_grace: Duration) -> Self {
        self.close_grace = close_grace;
        self
    }

    /// Run the benchmark and return the summed counters of every connection.
    ///
    /// ## Errors
    ///
    /// Only setup failures are errors: a connection that cannot be
    /// established in time, or a barrier that cannot be formed. I/O errors
    /// during the run end the affected loop and are logged, never returned.
    pub async fn run(&self) -> Result<RunReport> {
        info!("{}", RunConfigDisplay { config: &self.config });

        let connections = self.config.connections;
        let message = Message::zeroed(self.config.message_size);
        let gate = StartGate::new();
        let gate_handle = gate.handle();

        let mut workers: Vec<WorkerHandle> = Vec::with_capacity(connections);
        for id in 0..connections {
            let worker =
                ClientWorker::connect(id, &self.config.server_addr, self.config.dial_timeout)
                    .await
                    .with_context(|| {
                        format!(
                            "Connection {} of {} could not be established",
                            id + 1,
                            connections
                        )
                    })?;
            workers.push(worker.start(&gate_handle, message.clone()));
        }
        drop(gate_handle);
        debug!("Dialed {} connections", connections);

        gate.wait_ready(connections * 2).await?;
        let started = Instant::now();
        let deadline = started + self.config.duration;
        gate.release(deadline);
        info!(
            "All {} connections ready, running for {:?}",
            connections, self.config.duration
        );

        sleep_until(deadline).await;

        for worker in workers.iter_mut() {
            worker.close();
        }
        debug!("Closed {} connections", connections);

        let join_deadline = Instant::now() + self.close_grace;
        let mut total = RunReport::default();
        for worker in workers {
            total += worker.join_until(join_deadline).await;
        }

        info!(
            "Run finished after {:?}: {} sent, {} received",
            started.elapsed(),
            total.send_count,
            total.recv_count
        );
        Ok(total)
    }
}
