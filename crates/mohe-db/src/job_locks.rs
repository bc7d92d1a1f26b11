//! Job lock repository implementation.
//!
//! Claims and transitions are single conditional statements, so two workers
//! racing on the same `(job_name, chunk_id)` are serialized by PostgreSQL's
//! row locking and the unique constraint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use mohe_core::defaults::LOCK_EXPIRED_ERROR;
use mohe_core::{
    Error, JobLock, LockStats, LockStatus, LockStore, LockTransition, Result,
};

const LOCK_COLUMNS: &str = "job_name, chunk_id, worker_id, worker_host, status, locked_at, \
     started_at, completed_at, expires_at, retry_count, max_retries, last_error, created_at, updated_at";

/// PostgreSQL implementation of LockStore.
#[derive(Clone)]
pub struct PgLockStore {
    pool: Pool<Postgres>,
}

impl PgLockStore {
    /// Create a new PgLockStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a job_lock row into a JobLock struct.
    fn parse_lock_row(row: sqlx::postgres::PgRow) -> Result<JobLock> {
        let status: String = row.get("status");
        let status = status.parse::<LockStatus>().map_err(Error::Serialization)?;
        Ok(JobLock {
            job_name: row.get("job_name"),
            chunk_id: row.get("chunk_id"),
            worker_id: row.get("worker_id"),
            worker_host: row.get("worker_host"),
            status,
            locked_at: row.get("locked_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            expires_at: row.get("expires_at"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            last_error: row.get("last_error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// SET clause applied by an owner transition. `$5` is the timestamp,
    /// `$6` the error text for failures.
    fn transition_sql(transition: &LockTransition) -> &'static str {
        match transition {
            LockTransition::Processing => {
                "UPDATE job_lock
                 SET status = 'PROCESSING', started_at = $5, updated_at = $5
                 WHERE job_name = $1 AND chunk_id = $2 AND worker_id = $3 AND status = $4"
            }
            LockTransition::Completed => {
                "UPDATE job_lock
                 SET status = 'COMPLETED', completed_at = $5, updated_at = $5
                 WHERE job_name = $1 AND chunk_id = $2 AND worker_id = $3 AND status = $4"
            }
            LockTransition::Failed { .. } => {
                "UPDATE job_lock
                 SET status = 'FAILED', last_error = $6, retry_count = retry_count + 1,
                     updated_at = $5
                 WHERE job_name = $1 AND chunk_id = $2 AND worker_id = $3 AND status = $4"
            }
        }
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn try_claim(&self, claim: &JobLock) -> Result<bool> {
        // Insert when absent; otherwise take over only a retryable FAILED row.
        // retry_count and created_at of a reclaimed row are left untouched.
        let id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO job_lock (job_name, chunk_id, worker_id, worker_host, status, locked_at,
                                   expires_at, retry_count, max_retries, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'LOCKED', $5, $6, 0, $7, $5, $5)
             ON CONFLICT (job_name, chunk_id) DO UPDATE
             SET worker_id = EXCLUDED.worker_id,
                 worker_host = EXCLUDED.worker_host,
                 status = 'LOCKED',
                 locked_at = EXCLUDED.locked_at,
                 started_at = NULL,
                 completed_at = NULL,
                 expires_at = EXCLUDED.expires_at,
                 updated_at = EXCLUDED.updated_at
             WHERE job_lock.status = 'FAILED'
               AND job_lock.retry_count < job_lock.max_retries
             RETURNING id",
        )
        .bind(&claim.job_name)
        .bind(&claim.chunk_id)
        .bind(&claim.worker_id)
        .bind(&claim.worker_host)
        .bind(claim.locked_at)
        .bind(claim.expires_at)
        .bind(claim.max_retries)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id.is_some())
    }

    async fn get(&self, job_name: &str, chunk_id: &str) -> Result<Option<JobLock>> {
        let row = sqlx::query(&format!(
            "SELECT {LOCK_COLUMNS} FROM job_lock WHERE job_name = $1 AND chunk_id = $2"
        ))
        .bind(job_name)
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_lock_row).transpose()
    }

    async fn update_if_owner(
        &self,
        job_name: &str,
        chunk_id: &str,
        worker_id: &str,
        expected: LockStatus,
        transition: &LockTransition,
    ) -> Result<bool> {
        let error = match transition {
            LockTransition::Failed { error } => Some(error.as_str()),
            _ => None,
        };

        let mut query = sqlx::query(Self::transition_sql(transition))
            .bind(job_name)
            .bind(chunk_id)
            .bind(worker_id)
            .bind(expected.as_str())
            .bind(Utc::now());
        if let Some(error) = error {
            query = query.bind(error);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "job_locks",
            op = "update_if_owner",
            job_name,
            chunk_id,
            worker_id,
            target = transition.target().as_str(),
            rows_affected = result.rows_affected(),
            "Lock transition applied"
        );
        Ok(result.rows_affected() > 0)
    }

    async fn renew(
        &self,
        job_name: &str,
        worker_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE job_lock
             SET expires_at = $3, updated_at = $4
             WHERE job_name = $1 AND worker_id = $2 AND status IN ('LOCKED', 'PROCESSING')",
        )
        .bind(job_name)
        .bind(worker_id)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn expire_stale(&self, job_name: &str, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE job_lock
             SET status = 'FAILED', last_error = $3, updated_at = $2
             WHERE job_name = $1 AND status IN ('LOCKED', 'PROCESSING') AND expires_at < $2",
        )
        .bind(job_name)
        .bind(now)
        .bind(LOCK_EXPIRED_ERROR)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn find_retryable(&self, job_name: &str, limit: i64) -> Result<Vec<JobLock>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOCK_COLUMNS} FROM job_lock
             WHERE job_name = $1 AND status = 'FAILED' AND retry_count < max_retries
             ORDER BY updated_at ASC
             LIMIT $2"
        ))
        .bind(job_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_lock_row).collect()
    }

    async fn delete_completed_before(&self, job_name: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM job_lock
             WHERE job_name = $1 AND status = 'COMPLETED' AND completed_at < $2",
        )
        .bind(job_name)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn list(&self, job_name: &str) -> Result<Vec<JobLock>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOCK_COLUMNS} FROM job_lock WHERE job_name = $1 ORDER BY chunk_id"
        ))
        .bind(job_name)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_lock_row).collect()
    }

    async fn list_for_worker(&self, worker_id: &str) -> Result<Vec<JobLock>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOCK_COLUMNS} FROM job_lock WHERE worker_id = $1 ORDER BY job_name, chunk_id"
        ))
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_lock_row).collect()
    }

    async fn stats(&self, job_name: &str) -> Result<LockStats> {
        let rows = sqlx::query(
            "SELECT status,
                    COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE retry_count >= max_retries) AS exhausted
             FROM job_lock
             WHERE job_name = $1
             GROUP BY status",
        )
        .bind(job_name)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut stats = LockStats {
            job_name: job_name.to_string(),
            ..Default::default()
        };
        for row in rows {
            let status: String = row.get("status");
            let total: i64 = row.get("total");
            match status.parse::<LockStatus>().map_err(Error::Serialization)? {
                LockStatus::Locked => stats.locked = total,
                LockStatus::Processing => stats.processing = total,
                LockStatus::Completed => stats.completed = total,
                LockStatus::Failed => {
                    stats.failed = total;
                    stats.exhausted = row.get("exhausted");
                }
            }
        }
        Ok(stats)
    }
}
