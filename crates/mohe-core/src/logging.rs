//! Structured logging schema and field name constants for mohe.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation can query by the same names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, lock acquisition, chunk completions |
//! | DEBUG | Decision points (contention, foreign owner), config choices |
//! | TRACE | Per-item iteration (candidate pairs, rows) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "similarity", "topk", "db", "jobs", "inference"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "engine", "maintainer", "coordinator", "maintenance", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "score", "refresh_topk", "try_acquire_lock", "sweep"
pub const OPERATION: &str = "op";

/// Worker identity (`hostname-xxxxxxxx`).
pub const WORKER_ID: &str = "worker_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Batch job name owning a lock.
pub const JOB_NAME: &str = "job_name";

/// Chunk identifier within a job.
pub const CHUNK_ID: &str = "chunk_id";

/// Place being operated on.
pub const PLACE_ID: &str = "place_id";

/// User being operated on.
pub const USER_ID: &str = "user_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned.
pub const RESULT_COUNT: &str = "result_count";

/// Number of candidate places considered.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Number of rows affected by a bulk statement.
pub const ROWS_AFFECTED: &str = "rows_affected";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Database table affected.
pub const DB_TABLE: &str = "db_table";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
