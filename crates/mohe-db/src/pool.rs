//! Connection pool sized for batch workers.
//!
//! A worker holds one connection per concurrent top-K refresh plus a small
//! reserve for lock traffic, so the pool is sized from the refresh fan-out
//! rather than configured by hand.

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use mohe_core::defaults::{
    DB_ACQUIRE_TIMEOUT_SECS, DB_APPLICATION_NAME, DB_RESERVED_CONNECTIONS, TOPK_BATCH_CONCURRENCY,
};
use mohe_core::{Error, Result};

/// Pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Shown in `pg_stat_activity`, which makes lock holders easy to spot.
    pub application_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::for_concurrency(TOPK_BATCH_CONCURRENCY)
    }
}

impl PoolConfig {
    /// Enough connections for `concurrency` parallel refreshes plus the
    /// reserved lock connections.
    pub fn for_concurrency(concurrency: usize) -> Self {
        let fan_out = u32::try_from(concurrency.max(1)).unwrap_or(u32::MAX);
        Self {
            max_connections: fan_out.saturating_add(DB_RESERVED_CONNECTIONS),
            acquire_timeout: Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS),
            application_name: DB_APPLICATION_NAME.to_string(),
        }
    }

    /// Apply `MOHE_DB_MAX_CONNECTIONS` and `MOHE_DB_ACQUIRE_TIMEOUT_SECS`
    /// overrides on top of `self`.
    pub fn with_env_overrides(self) -> Self {
        let max_connections = std::env::var("MOHE_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(self.max_connections);
        let acquire_timeout = std::env::var("MOHE_DB_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.acquire_timeout);
        self.with_max_connections(max_connections)
            .with_acquire_timeout(acquire_timeout)
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n.max(DB_RESERVED_CONNECTIONS);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }
}

/// Open a pool against `database_url`.
pub async fn create_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let options = PgConnectOptions::from_str(database_url)
        .map_err(Error::Database)?
        .application_name(&config.application_name);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        application_name = %config.application_name,
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool ready"
    );
    Ok(pool)
}

/// Log pool usage. Warns when every connection is checked out, which stalls
/// lock heartbeats behind refresh queries.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle() as u32;

    debug!(
        subsystem = "db",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool usage"
    );

    if idle == 0 && size > 0 {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = size,
            "No idle connections left, lock heartbeats may be delayed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sized_from_refresh_concurrency() {
        let config = PoolConfig::for_concurrency(8);
        assert_eq!(config.max_connections, 8 + DB_RESERVED_CONNECTIONS);
        assert_eq!(config.application_name, DB_APPLICATION_NAME);

        // Zero concurrency still leaves room for one refresh.
        assert_eq!(
            PoolConfig::for_concurrency(0).max_connections,
            1 + DB_RESERVED_CONNECTIONS
        );
    }

    #[test]
    fn test_max_connections_never_below_reserve() {
        let config = PoolConfig::default().with_max_connections(0);
        assert_eq!(config.max_connections, DB_RESERVED_CONNECTIONS);
    }
}
