//! # Start Barrier
//!
//! One coordinator and many loops meet here. Every loop announces that it is
//! ready and then parks on a broadcast-once start signal; the coordinator
//! waits until it has seen the expected number of ready announcements and
//! only then fires the signal.
//!
//! The start signal carries the run deadline, so every loop learns the same
//! deadline at the same moment it is released.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// Coordinator side of the start barrier
pub struct StartGate {
    ready: Arc<Semaphore>,
    start_tx: watch::Sender<Option<Instant>>,
}

/// Loop side of the start barrier
#[derive(Clone)]
pub struct GateHandle {
    ready: Arc<Semaphore>,
    start_rx: watch::Receiver<Option<Instant>>,
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StartGate {
    pub fn new() -> Self {
        let (start_tx, _) = watch::channel(None);
        Self {
            ready: Arc::new(Semaphore::new(0)),
            start_tx,
        }
    }

    /// Create a handle for one more waiting loop.
    pub fn handle(&self) -> GateHandle {
        GateHandle {
            ready: self.ready.clone(),
            start_rx: self.start_tx.subscribe(),
        }
    }

    /// Wait until `participants` loops have called [`GateHandle::arrive_and_wait`].
    pub async fn wait_ready(&self, participants: usize) -> Result<()> {
        let permits = u32::try_from(participants)
            .with_context(|| format!("Too many barrier participants: {}", participants))?;
        let acquired = self
            .ready
            .acquire_many(permits)
            .await
            .map_err(|_| anyhow!("Start barrier closed before all participants were ready"))?;
        acquired.forget();
        debug!("All {} loops signaled ready", participants);
        Ok(())
    }

    /// Release every waiting loop. Only the first release has any effect.
    pub fn release(&self, deadline: Instant) {
        self.start_tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(deadline);
            true
        });
    }

    pub fn is_released(&self) -> bool {
        self.start_tx.borrow().is_some()
    }
}

impl GateHandle {
    /// Announce readiness, then block until the coordinator releases the gate.
    ///
    /// Returns the run deadline, or `None` if the coordinator went away
    /// without releasing.
    pub async fn arrive_and_wait(mut self) -> Option<Instant> {
        self.ready.add_permits(1);
        let deadline = match self.start_rx.wait_for(|start| start.is_some()).await {
            Ok(start) => *start,
            Err(_) => None,
        };
        deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_work_before_last_arrival() {
        let gate = StartGate::new();
        let work_done = Arc::new(AtomicUsize::new(0));
        let slow_arrived = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let handle = gate.handle();
            let work_done = work_done.clone();
            let slow_arrived = slow_arrived.clone();
            tasks.push(tokio::spawn(async move {
                if i == 0 {
                    // Simulates a connection that takes long to set up.
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    slow_arrived.store(1, Ordering::SeqCst);
                }
                if handle.arrive_and_wait().await.is_some() {
                    work_done.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        // Give the fast participants time to run ahead if the gate leaked.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(work_done.load(Ordering::SeqCst), 0);

        gate.wait_ready(8).await.unwrap();
        assert_eq!(slow_arrived.load(Ordering::SeqCst), 1);
        assert_eq!(work_done.load(Ordering::SeqCst), 0);

        gate.release(Instant::now() + Duration::from_secs(1));
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(work_done.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_release_happens_once() {
        let gate = StartGate::new();
        let first = Instant::now() + Duration::from_secs(5);
        let handle = gate.handle();

        gate.release(first);
        gate.release(first + Duration::from_secs(5));
        assert!(gate.is_released());

        // A late arrival still sees the first deadline.
        assert_eq!(handle.arrive_and_wait().await, Some(first));
    }

    #[tokio::test]
    async fn test_dropped_gate_unblocks_waiters() {
        let gate = StartGate::new();
        let handle = gate.handle();
        let task = tokio::spawn(handle.arrive_and_wait());

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(gate);
        assert_eq!(task.await.unwrap(), None);
    }
}
