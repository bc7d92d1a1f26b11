//! Distributed chunk locks for batch jobs.
//!
//! Workers on different hosts split a batch job into chunks and race to
//! claim them through a shared [`LockStore`]. Each chunk row moves through
//!
//! ```text
//! (none) -> LOCKED -> PROCESSING -> COMPLETED
//!                                \-> FAILED -> LOCKED (while retries remain)
//! ```
//!
//! Only the owning worker may move a row forward. Rows whose lease runs out
//! are swept to FAILED by any worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mohe_core::defaults::{
    LOCK_HEARTBEAT_SECS, LOCK_MAX_RETRIES, LOCK_RETENTION_DAYS, LOCK_TTL_SECS,
};
use mohe_core::{JobLock, LockStats, LockStore, LockTransition, Result};

/// Identity of this worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    /// `<host>-<8 hex chars>`, unique per process.
    pub worker_id: String,
    pub host: String,
}

impl WorkerIdentity {
    /// Build an identity from the local hostname and a random suffix.
    pub fn generate() -> Self {
        let host = local_hostname();
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self::new(host, &suffix)
    }

    pub fn new(host: impl Into<String>, suffix: &str) -> Self {
        let host = host.into();
        Self {
            worker_id: format!("{}-{}", host, suffix),
            host,
        }
    }
}

/// `HOSTNAME`, then `/etc/hostname`, then `"unknown"`.
fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Lock lease configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Lease length of a claim and of each renewal.
    pub ttl: Duration,
    /// Interval between heartbeat renewals. Kept short enough that the
    /// jittered interval stays below `ttl`.
    pub heartbeat_interval: Duration,
    /// How long COMPLETED rows are kept.
    pub retention: Duration,
    pub max_retries: i32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(LOCK_TTL_SECS as u64),
            heartbeat_interval: Duration::from_secs(LOCK_HEARTBEAT_SECS),
            retention: Duration::from_secs(LOCK_RETENTION_DAYS as u64 * 24 * 60 * 60),
            max_retries: LOCK_MAX_RETRIES,
        }
    }
}

impl LockConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `MOHE_LOCK_TTL_SECS` | `600` | Lease length |
    /// | `MOHE_LOCK_HEARTBEAT_SECS` | `60` | Renewal interval |
    /// | `MOHE_LOCK_RETENTION_DAYS` | `7` | Completed row retention |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ttl = std::env::var("MOHE_LOCK_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.ttl);

        let heartbeat_interval = std::env::var("MOHE_LOCK_HEARTBEAT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.heartbeat_interval);

        let retention = std::env::var("MOHE_LOCK_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|days| Duration::from_secs(days * 24 * 60 * 60))
            .unwrap_or(defaults.retention);

        Self {
            ttl,
            heartbeat_interval,
            retention,
            ..defaults
        }
        .clamp_heartbeat()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self.clamp_heartbeat()
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.clamp_heartbeat()
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// A heartbeat that could reach the TTL once the maintenance loop adds
    /// its tenth of jitter falls back to half the TTL.
    fn clamp_heartbeat(mut self) -> Self {
        let max = self.ttl / 2;
        let worst_case = self.heartbeat_interval.as_secs_f64() * 1.1;
        if worst_case >= self.ttl.as_secs_f64() && !max.is_zero() {
            self.heartbeat_interval = max;
        }
        self
    }
}

/// Converts a std duration for timestamp arithmetic, saturating on overflow.
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

/// Chunk lock operations for one worker.
#[derive(Clone)]
pub struct DistributedLockCoordinator {
    store: Arc<dyn LockStore>,
    identity: WorkerIdentity,
    config: LockConfig,
}

impl DistributedLockCoordinator {
    pub fn new(store: Arc<dyn LockStore>, identity: WorkerIdentity, config: LockConfig) -> Self {
        info!(
            subsystem = "jobs",
            component = "lock_coordinator",
            worker_id = %identity.worker_id,
            ttl_secs = config.ttl.as_secs(),
            heartbeat_secs = config.heartbeat_interval.as_secs(),
            "Lock coordinator initialized"
        );
        Self {
            store,
            identity,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.identity.worker_id
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Claim a chunk for `ttl`.
    ///
    /// `Ok(false)` when another worker holds it or it cannot be retried.
    /// Store failures are logged and also reported as `Ok(false)`.
    pub async fn try_acquire_lock(
        &self,
        job_name: &str,
        chunk_id: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let claim = JobLock::claim(
            job_name,
            chunk_id,
            &self.identity.worker_id,
            &self.identity.host,
            to_chrono(ttl),
        )
        .with_max_retries(self.config.max_retries);

        match self.store.try_claim(&claim).await {
            Ok(true) => {
                info!(
                    subsystem = "jobs",
                    component = "lock_coordinator",
                    op = "acquire",
                    job_name,
                    chunk_id,
                    worker_id = %self.identity.worker_id,
                    "Lock acquired"
                );
                Ok(true)
            }
            Ok(false) => {
                debug!(
                    subsystem = "jobs",
                    component = "lock_coordinator",
                    op = "acquire",
                    job_name,
                    chunk_id,
                    "Chunk held by another worker"
                );
                Ok(false)
            }
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "lock_coordinator",
                    op = "acquire",
                    job_name,
                    chunk_id,
                    error = %e,
                    "Lock claim failed"
                );
                Ok(false)
            }
        }
    }

    /// Claim a chunk with the configured TTL.
    pub async fn try_acquire_lock_default(&self, job_name: &str, chunk_id: &str) -> Result<bool> {
        self.try_acquire_lock(job_name, chunk_id, self.config.ttl)
            .await
    }

    /// Apply an owner transition. Missing rows, foreign rows and rows in a
    /// state that does not allow the transition are left untouched.
    async fn transition(
        &self,
        job_name: &str,
        chunk_id: &str,
        transition: LockTransition,
    ) -> Result<bool> {
        let target = transition.target();
        let Some(lock) = self.store.get(job_name, chunk_id).await? else {
            warn!(
                subsystem = "jobs",
                component = "lock_coordinator",
                job_name,
                chunk_id,
                to_status = %target,
                "Lock not found"
            );
            return Ok(false);
        };

        if lock.worker_id != self.identity.worker_id {
            debug!(
                subsystem = "jobs",
                component = "lock_coordinator",
                job_name,
                chunk_id,
                owner = %lock.worker_id,
                to_status = %target,
                "Lock owned by another worker, ignoring"
            );
            return Ok(false);
        }

        if !transition.allowed_from(lock.status) {
            debug!(
                subsystem = "jobs",
                component = "lock_coordinator",
                job_name,
                chunk_id,
                status = %lock.status,
                to_status = %target,
                "Transition not allowed from current status"
            );
            return Ok(false);
        }

        let updated = self
            .store
            .update_if_owner(
                job_name,
                chunk_id,
                &self.identity.worker_id,
                lock.status,
                &transition,
            )
            .await?;

        if updated {
            debug!(
                subsystem = "jobs",
                component = "lock_coordinator",
                job_name,
                chunk_id,
                from = %lock.status,
                to_status = %target,
                "Lock transitioned"
            );
        } else {
            debug!(
                subsystem = "jobs",
                component = "lock_coordinator",
                job_name,
                chunk_id,
                to_status = %target,
                "Lock changed concurrently, transition skipped"
            );
        }
        Ok(updated)
    }

    pub async fn mark_processing(&self, job_name: &str, chunk_id: &str) -> Result<bool> {
        self.transition(job_name, chunk_id, LockTransition::Processing)
            .await
    }

    pub async fn mark_completed(&self, job_name: &str, chunk_id: &str) -> Result<bool> {
        let updated = self
            .transition(job_name, chunk_id, LockTransition::Completed)
            .await?;
        if updated {
            info!(
                subsystem = "jobs",
                component = "lock_coordinator",
                job_name,
                chunk_id,
                "Chunk completed"
            );
        }
        Ok(updated)
    }

    /// Record a failure. Increments the retry count.
    pub async fn mark_failed(&self, job_name: &str, chunk_id: &str, error: &str) -> Result<bool> {
        let updated = self
            .transition(
                job_name,
                chunk_id,
                LockTransition::Failed {
                    error: error.to_string(),
                },
            )
            .await?;
        if updated {
            warn!(
                subsystem = "jobs",
                component = "lock_coordinator",
                job_name,
                chunk_id,
                error,
                "Chunk failed"
            );
        }
        Ok(updated)
    }

    /// Push back the expiry of every live lock this worker holds for `job_name`.
    pub async fn renew_locks(&self, job_name: &str, extension: Duration) -> Result<u64> {
        let expires_at = Utc::now() + to_chrono(extension);
        let renewed = self
            .store
            .renew(job_name, &self.identity.worker_id, expires_at)
            .await?;
        if renewed > 0 {
            debug!(
                subsystem = "jobs",
                component = "lock_coordinator",
                op = "renew",
                job_name,
                rows_affected = renewed,
                "Locks renewed"
            );
        }
        Ok(renewed)
    }

    /// Fail every live lock of `job_name` whose lease has run out.
    pub async fn mark_expired_as_failed(&self, job_name: &str) -> Result<u64> {
        let expired = self.store.expire_stale(job_name, Utc::now()).await?;
        if expired > 0 {
            warn!(
                subsystem = "jobs",
                component = "lock_coordinator",
                op = "expire",
                job_name,
                rows_affected = expired,
                "Expired locks marked failed"
            );
        }
        Ok(expired)
    }

    /// FAILED chunks with retries left, oldest first.
    pub async fn find_retryable_chunks(&self, job_name: &str, limit: i64) -> Result<Vec<JobLock>> {
        self.store.find_retryable(job_name, limit).await
    }

    /// Delete COMPLETED rows that finished more than `older_than` ago.
    pub async fn cleanup_completed(&self, job_name: &str, older_than: Duration) -> Result<u64> {
        let cutoff = Utc::now() - to_chrono(older_than);
        let deleted = self.store.delete_completed_before(job_name, cutoff).await?;
        info!(
            subsystem = "jobs",
            component = "lock_coordinator",
            op = "cleanup",
            job_name,
            rows_affected = deleted,
            "Completed locks cleaned up"
        );
        Ok(deleted)
    }

    pub async fn get_lock(&self, job_name: &str, chunk_id: &str) -> Result<Option<JobLock>> {
        self.store.get(job_name, chunk_id).await
    }

    pub async fn get_locks(&self, job_name: &str) -> Result<Vec<JobLock>> {
        self.store.list(job_name).await
    }

    /// Every lock row currently attributed to this worker.
    pub async fn my_locks(&self) -> Result<Vec<JobLock>> {
        self.store.list_for_worker(&self.identity.worker_id).await
    }

    pub async fn lock_stats(&self, job_name: &str) -> Result<LockStats> {
        self.store.stats(job_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_format() {
        let identity = WorkerIdentity::generate();
        let (host, suffix) = identity
            .worker_id
            .rsplit_once('-')
            .expect("worker id has a suffix");
        assert_eq!(host, identity.host);
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identities_are_unique() {
        assert_ne!(
            WorkerIdentity::generate().worker_id,
            WorkerIdentity::generate().worker_id
        );
    }

    #[test]
    fn test_lock_config_defaults() {
        let config = LockConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(600));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(config.retention, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_heartbeat_clamped_below_ttl() {
        let config = LockConfig::default()
            .with_ttl(Duration::from_secs(30))
            .with_heartbeat_interval(Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_heartbeat_clamped_when_jitter_reaches_ttl() {
        // 95s plus up to 9.5s of jitter overruns a 100s lease.
        let config = LockConfig::default()
            .with_ttl(Duration::from_secs(100))
            .with_heartbeat_interval(Duration::from_secs(95));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(50));

        // 90s plus at most 9s still renews inside the lease.
        let config = LockConfig::default()
            .with_ttl(Duration::from_secs(100))
            .with_heartbeat_interval(Duration::from_secs(90));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(90));
    }
}
