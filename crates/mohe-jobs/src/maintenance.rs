//! Background heartbeat and expiry sweep for chunk locks.
//!
//! Each tick renews this worker's live locks for every tracked job, then
//! fails locks (from any worker) whose lease has run out. Every store call
//! is bounded by the lock TTL.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use mohe_core::{Error, Result};

use crate::coordinator::DistributedLockCoordinator;

const EVENT_CAPACITY: usize = 64;

/// Event emitted by the maintenance loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceEvent {
    Renewed { job_name: String, count: u64 },
    ExpiredSwept { job_name: String, count: u64 },
    TickFailed { job_name: String, error: String },
    Stopped,
}

/// Handle for controlling a running maintenance loop.
pub struct MaintenanceHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<MaintenanceEvent>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal the loop to stop and wait for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Maintenance task failed: {}", e)))
    }

    /// Get a receiver for maintenance events.
    pub fn events(&self) -> broadcast::Receiver<MaintenanceEvent> {
        self.event_rx.resubscribe()
    }
}

/// Periodic lock renewal and expiry sweep for a set of jobs.
pub struct LockMaintenance {
    coordinator: DistributedLockCoordinator,
    jobs: Vec<String>,
    event_tx: broadcast::Sender<MaintenanceEvent>,
}

impl LockMaintenance {
    pub fn new(coordinator: DistributedLockCoordinator, jobs: Vec<String>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            coordinator,
            jobs,
            event_tx,
        }
    }

    /// Spawn the loop and return a handle for control.
    pub fn start(self) -> MaintenanceHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let task = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        MaintenanceHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        let interval = self.coordinator.config().heartbeat_interval;
        info!(
            subsystem = "jobs",
            component = "lock_maintenance",
            jobs = ?self.jobs,
            heartbeat_ms = interval.as_millis() as u64,
            "Lock maintenance started"
        );

        loop {
            self.tick().await;

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(
                        subsystem = "jobs",
                        component = "lock_maintenance",
                        "Lock maintenance received shutdown signal"
                    );
                    break;
                }
                _ = sleep(interval + jitter(interval)) => {}
            }
        }

        let _ = self.event_tx.send(MaintenanceEvent::Stopped);
        info!(
            subsystem = "jobs",
            component = "lock_maintenance",
            "Lock maintenance stopped"
        );
    }

    /// Run one renewal and sweep pass over every tracked job.
    pub async fn tick(&self) {
        let ttl = self.coordinator.config().ttl;
        for job_name in &self.jobs {
            match bounded(ttl, self.coordinator.renew_locks(job_name, ttl)).await {
                Ok(count) => {
                    let _ = self.event_tx.send(MaintenanceEvent::Renewed {
                        job_name: job_name.clone(),
                        count,
                    });
                }
                Err(e) => self.tick_failed(job_name, "renew", e),
            }

            match bounded(ttl, self.coordinator.mark_expired_as_failed(job_name)).await {
                Ok(count) => {
                    let _ = self.event_tx.send(MaintenanceEvent::ExpiredSwept {
                        job_name: job_name.clone(),
                        count,
                    });
                }
                Err(e) => self.tick_failed(job_name, "expire", e),
            }
        }
        debug!(
            subsystem = "jobs",
            component = "lock_maintenance",
            "Maintenance tick finished"
        );
    }

    fn tick_failed(&self, job_name: &str, op: &str, error: Error) {
        warn!(
            subsystem = "jobs",
            component = "lock_maintenance",
            op,
            job_name,
            error = %error,
            "Lock maintenance step failed"
        );
        let _ = self.event_tx.send(MaintenanceEvent::TickFailed {
            job_name: job_name.to_string(),
            error: error.to_string(),
        });
    }
}

async fn bounded<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "lock maintenance exceeded {}ms",
            limit.as_millis()
        ))),
    }
}

/// Up to a tenth of `interval`, so workers started together drift apart.
fn jitter(interval: Duration) -> Duration {
    let max_ms = (interval.as_millis() / 10) as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
