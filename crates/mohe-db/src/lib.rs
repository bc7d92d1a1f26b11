//! # mohe-db
//!
//! PostgreSQL database layer for the mohe similarity engine.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL + pgvector implementations of every `mohe-core` store trait
//! - In-memory implementations of the same traits ([`memory`])
//! - The SQL migrations the stores expect (behind the `migrations` feature)
//!
//! ## Example
//!
//! ```rust,ignore
//! use mohe_db::{Database, LockStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/mohe").await?;
//!     let stats = db.locks.stats("topk-refresh").await?;
//!     println!("{} chunks completed", stats.completed);
//!     Ok(())
//! }
//! ```

pub mod bookmarks;
pub mod job_locks;
pub mod keyword_catalog;
pub mod memory;
pub mod pool;
pub mod similarity_cache;
pub mod topk;
pub mod vectors;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use mohe_core::*;

// Re-export repository implementations
pub use bookmarks::PgBookmarkGraph;
pub use job_locks::PgLockStore;
pub use keyword_catalog::PgKeywordCatalogRepository;
pub use memory::{
    InMemoryBookmarkGraph, InMemoryKeywordCatalog, InMemoryLockStore, InMemoryPlaceTextSource,
    InMemorySimilarityCache, InMemoryTopKStore, InMemoryVectorStore,
};
pub use pool::{create_pool, log_pool_metrics, PoolConfig};
pub use similarity_cache::PgSimilarityCache;
pub use topk::PgTopKStore;
pub use vectors::PgVectorStore;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Preference and description vectors.
    pub vectors: PgVectorStore,
    /// Distributed job locks.
    pub locks: PgLockStore,
    /// Per-place neighbor lists.
    pub topk: PgTopKStore,
    /// User bookmarks.
    pub bookmarks: PgBookmarkGraph,
    /// Cached user-place similarities.
    pub similarity_cache: PgSimilarityCache,
    /// Keyword catalog seed data.
    pub keywords: PgKeywordCatalogRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            vectors: PgVectorStore::new(pool.clone()),
            locks: PgLockStore::new(pool.clone()),
            topk: PgTopKStore::new(pool.clone()),
            bookmarks: PgBookmarkGraph::new(pool.clone()),
            similarity_cache: PgSimilarityCache::new(pool.clone()),
            keywords: PgKeywordCatalogRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with a pool sized for the default refresh concurrency.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool(url, &config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
