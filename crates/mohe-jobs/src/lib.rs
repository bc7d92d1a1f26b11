//! # mohe-jobs
//!
//! Distributed batch jobs for mohe.
//!
//! This crate provides:
//! - Chunk locks shared by workers on many hosts
//! - Heartbeat renewal and expiry sweep of those locks
//! - A runner that claims chunks and records their outcome
//! - Handlers for top-K refresh and description vector regeneration
//!
//! ## Example
//!
//! ```ignore
//! use mohe_jobs::{
//!     plan_chunks, ChunkRunner, DistributedLockCoordinator, LockConfig, LockMaintenance,
//!     WorkerIdentity,
//! };
//! use mohe_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//! let coordinator = DistributedLockCoordinator::new(
//!     Arc::new(db.locks.clone()),
//!     WorkerIdentity::generate(),
//!     LockConfig::from_env(),
//! );
//!
//! // Keep leases alive while chunks run
//! let maintenance = LockMaintenance::new(coordinator.clone(), vec!["topk-refresh".into()]).start();
//!
//! let runner = ChunkRunner::new(coordinator, handler);
//! let chunk_ids: Vec<String> = plan_chunks(1, 10_000, 100).iter().map(|c| c.chunk_id()).collect();
//! let summary = runner.run_all(&chunk_ids).await;
//!
//! maintenance.shutdown().await?;
//! ```

pub mod chunks;
pub mod coordinator;
pub mod handler;
pub mod handlers;
pub mod maintenance;
pub mod runner;

// Re-export core types
pub use mohe_core::*;

pub use chunks::{plan_chunks, ChunkRange};
pub use coordinator::{DistributedLockCoordinator, LockConfig, WorkerIdentity};
pub use handler::{ChunkContext, ChunkHandler, ChunkResult, NoOpChunkHandler};
pub use handlers::{
    EmbeddingRefreshHandler, TopKRefreshHandler, EMBEDDING_REFRESH_JOB, TOPK_REFRESH_JOB,
};
pub use maintenance::{LockMaintenance, MaintenanceEvent, MaintenanceHandle};
pub use runner::{ChunkOutcome, ChunkRunner, RunSummary};

/// Default chunk size in place ids.
pub const DEFAULT_CHUNK_SIZE: i64 = mohe_core::defaults::CHUNK_SIZE;

/// Default number of retryable chunks picked up per pass.
pub const DEFAULT_RETRY_LIMIT: i64 = mohe_core::defaults::RETRYABLE_CHUNK_LIMIT;
