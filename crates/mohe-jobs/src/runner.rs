//! Runs chunk handlers under distributed locks.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{info, warn};

use mohe_core::Result;

use crate::chunks::ChunkRange;
use crate::coordinator::DistributedLockCoordinator;
use crate::handler::{ChunkContext, ChunkHandler, ChunkResult};

/// What happened to one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Another worker holds the chunk, or it is finished or out of retries.
    Skipped,
    Completed { processed: usize },
    Failed { error: String },
    /// The handler finished but this worker no longer owned the lock, so
    /// its result was not recorded. The new owner decides the chunk's fate.
    Lost { processed: usize },
}

/// Totals across a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Chunks whose lock was taken over before their result was recorded.
    #[serde(default)]
    pub lost: usize,
    /// Items processed by completed chunks.
    pub processed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &ChunkOutcome) {
        match outcome {
            ChunkOutcome::Skipped => self.skipped += 1,
            ChunkOutcome::Completed { processed } => {
                self.completed += 1;
                self.processed += processed;
            }
            ChunkOutcome::Failed { .. } => self.failed += 1,
            ChunkOutcome::Lost { .. } => self.lost += 1,
        }
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.lost += other.lost;
        self.processed += other.processed;
    }
}

/// Claims chunks, runs the handler and records the result on the lock row.
#[derive(Clone)]
pub struct ChunkRunner {
    coordinator: DistributedLockCoordinator,
    handler: Arc<dyn ChunkHandler>,
}

impl ChunkRunner {
    pub fn new(coordinator: DistributedLockCoordinator, handler: Arc<dyn ChunkHandler>) -> Self {
        Self {
            coordinator,
            handler,
        }
    }

    pub fn job_name(&self) -> &str {
        self.handler.job_name()
    }

    pub fn coordinator(&self) -> &DistributedLockCoordinator {
        &self.coordinator
    }

    /// Process one chunk if this worker can claim it.
    pub async fn run_chunk(&self, chunk_id: &str) -> Result<ChunkOutcome> {
        let job_name = self.handler.job_name();
        let range = ChunkRange::parse(chunk_id)?;

        if !self
            .coordinator
            .try_acquire_lock_default(job_name, chunk_id)
            .await?
        {
            return Ok(ChunkOutcome::Skipped);
        }
        if !self.coordinator.mark_processing(job_name, chunk_id).await? {
            return Ok(ChunkOutcome::Skipped);
        }

        let retry_count = self
            .coordinator
            .get_lock(job_name, chunk_id)
            .await?
            .map(|lock| lock.retry_count)
            .unwrap_or(0);
        let ctx = ChunkContext {
            job_name: job_name.to_string(),
            chunk_id: chunk_id.to_string(),
            range,
            worker_id: self.coordinator.worker_id().to_string(),
            retry_count,
        };

        let start = Instant::now();
        let ttl = self.coordinator.config().ttl;
        let result = match timeout(ttl, self.handler.process(ctx)).await {
            Ok(result) => result,
            Err(_) => ChunkResult::Failed(format!("Chunk exceeded timeout of {}s", ttl.as_secs())),
        };

        match result {
            ChunkResult::Success { processed } => {
                if !self.coordinator.mark_completed(job_name, chunk_id).await? {
                    warn!(
                        subsystem = "jobs",
                        component = "chunk_runner",
                        job_name,
                        chunk_id,
                        processed,
                        "Lock lost before completion was recorded"
                    );
                    return Ok(ChunkOutcome::Lost { processed });
                }
                info!(
                    subsystem = "jobs",
                    component = "chunk_runner",
                    job_name,
                    chunk_id,
                    processed,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Chunk processed"
                );
                Ok(ChunkOutcome::Completed { processed })
            }
            ChunkResult::Failed(error) => {
                if !self
                    .coordinator
                    .mark_failed(job_name, chunk_id, &error)
                    .await?
                {
                    warn!(
                        subsystem = "jobs",
                        component = "chunk_runner",
                        job_name,
                        chunk_id,
                        error = %error,
                        "Lock lost before failure was recorded"
                    );
                    return Ok(ChunkOutcome::Lost { processed: 0 });
                }
                Ok(ChunkOutcome::Failed { error })
            }
        }
    }

    /// Run every chunk in order. A chunk that errors is counted as failed.
    pub async fn run_all(&self, chunk_ids: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();
        for chunk_id in chunk_ids {
            let outcome = match self.run_chunk(chunk_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        subsystem = "jobs",
                        component = "chunk_runner",
                        job_name = self.handler.job_name(),
                        chunk_id = %chunk_id,
                        error = %e,
                        "Chunk run errored"
                    );
                    ChunkOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            summary.record(&outcome);
        }
        summary
    }

    /// Re-run up to `limit` FAILED chunks that still have retries left.
    pub async fn run_retries(&self, limit: i64) -> Result<RunSummary> {
        let retryable = self
            .coordinator
            .find_retryable_chunks(self.handler.job_name(), limit)
            .await?;
        let chunk_ids: Vec<String> = retryable.into_iter().map(|l| l.chunk_id).collect();
        if !chunk_ids.is_empty() {
            info!(
                subsystem = "jobs",
                component = "chunk_runner",
                job_name = self.handler.job_name(),
                result_count = chunk_ids.len(),
                "Retrying failed chunks"
            );
        }
        Ok(self.run_all(&chunk_ids).await)
    }
}
