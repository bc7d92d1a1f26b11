//! Centralized default constants for the mohe similarity core.
//!
//! **This module is the single source of truth** for shared default values.
//! Config structs in the other crates start from these and allow overrides
//! through environment variables.

// =============================================================================
// VECTORS
// =============================================================================

/// Dimension of every preference and description vector.
pub const VECTOR_DIMENSION: usize = 100;

/// Maximum number of selected keywords attached to one vector.
pub const MAX_SELECTED_KEYWORDS: usize = 15;

// =============================================================================
// KEYWORD CONFIDENCE THRESHOLDS
// =============================================================================
//
// The three thresholds are intentionally separate knobs. They are used by
// different comparisons and merging them changes recommendation output.

/// Minimum confidence for keywords in user-vs-place Jaccard comparisons.
pub const CROSS_ENTITY_KEYWORD_THRESHOLD: f64 = 0.3;

/// Minimum confidence for place keywords considered by the trait boost.
pub const TRAIT_KEYWORD_THRESHOLD: f64 = 0.4;

/// Minimum confidence for "high-confidence" keyword filtering.
pub const HIGH_CONFIDENCE_KEYWORD_THRESHOLD: f64 = 0.5;

// =============================================================================
// SIMILARITY SCORING
// =============================================================================

/// Weight of cosine similarity in the user-place composite.
pub const COSINE_WEIGHT: f64 = 0.7;

/// Weight of keyword Jaccard similarity in the user-place composite.
pub const KEYWORD_JACCARD_WEIGHT: f64 = 0.3;

/// Multiplier applied when a trait-aligned keyword matches.
pub const TRAIT_BOOST: f64 = 1.2;

/// Multiplier applied when no trait rule matches.
pub const NO_TRAIT_BOOST: f64 = 1.0;

/// Upper bound of the weighted composite.
pub const WEIGHTED_SIMILARITY_CAP: f64 = 1.0;

/// Hours a cached user-place similarity stays fresh.
pub const SIMILARITY_CACHE_FRESH_HOURS: i64 = 24;

/// Minimum weighted similarity for user-to-place recommendations.
pub const MIN_RECOMMENDATION_SIMILARITY: f64 = 0.1;

// =============================================================================
// TOP-K NEIGHBORS
// =============================================================================

/// Number of neighbors kept per place.
pub const TOPK: usize = 20;

/// Weight of co-bookmark Jaccard in the neighbor composite.
pub const TOPK_JACCARD_WEIGHT: f64 = 0.7;

/// Weight of the binned co-bookmark cosine in the neighbor composite.
pub const TOPK_COSINE_WEIGHT: f64 = 0.3;

/// Weight of the binned description-vector cosine in the neighbor composite.
/// Lets places nobody has bookmarked yet still collect neighbors.
pub const TOPK_DESCRIPTION_WEIGHT: f64 = 0.1;

/// Co-bookmark cosine weight of a user with an MBTI on record.
pub const MBTI_KNOWN_WEIGHT: f64 = 2.0;

/// Co-bookmark cosine weight of a user without an MBTI.
pub const MBTI_UNKNOWN_WEIGHT: f64 = 1.0;

/// Time constant of the co-bookmark decay, in days. A shared bookmark pair
/// counts `exp(-age_days / tau)`, age taken from the more recent bookmark.
pub const TIME_DECAY_TAU_DAYS: f64 = 30.0;

/// Width of one cosine bin.
pub const COSINE_BIN_WIDTH: f64 = 0.05;

/// When the catalogue has at most this many places every place is a candidate.
pub const TOPK_CANDIDATE_CUTOFF: usize = 500;

/// Places refreshed concurrently by a batch refresh.
pub const TOPK_BATCH_CONCURRENCY: usize = 8;

// =============================================================================
// DISTRIBUTED JOB LOCKS
// =============================================================================

/// Default lock time-to-live in seconds (10 minutes).
pub const LOCK_TTL_SECS: i64 = 600;

/// Default heartbeat interval in seconds.
pub const LOCK_HEARTBEAT_SECS: u64 = 60;

/// Default maximum retries for a failed chunk.
pub const LOCK_MAX_RETRIES: i32 = 3;

/// Default retention of COMPLETED lock rows in days.
pub const LOCK_RETENTION_DAYS: i64 = 7;

/// Error recorded on locks reclaimed by the expiry sweep.
pub const LOCK_EXPIRED_ERROR: &str = "Lock expired";

/// Default number of places per chunk.
pub const CHUNK_SIZE: i64 = 100;

/// Default limit for retryable chunk lookups.
pub const RETRYABLE_CHUNK_LIMIT: i64 = 50;

// =============================================================================
// DATABASE POOL
// =============================================================================

/// Connections kept beside the refresh fan-out: one for the lock heartbeat,
/// one for the chunk runner's own lock updates.
pub const DB_RESERVED_CONNECTIONS: u32 = 2;

/// Seconds to wait for a pooled connection.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// `application_name` reported to Postgres.
pub const DB_APPLICATION_NAME: &str = "mohe-worker";

// =============================================================================
// EXTRACTION SERVICE
// =============================================================================

/// Default keyword extraction service URL.
pub const EXTRACTION_URL: &str = "http://127.0.0.1:8000";

/// Timeout for extraction requests in seconds.
pub const EXTRACTION_TIMEOUT_SECS: u64 = 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_weights_sum_to_one() {
        assert!((COSINE_WEIGHT + KEYWORD_JACCARD_WEIGHT - 1.0).abs() < f64::EPSILON);
        assert!((TOPK_JACCARD_WEIGHT + TOPK_COSINE_WEIGHT - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_keyword_thresholds_are_distinct_and_ordered() {
        assert!(CROSS_ENTITY_KEYWORD_THRESHOLD < TRAIT_KEYWORD_THRESHOLD);
        assert!(TRAIT_KEYWORD_THRESHOLD < HIGH_CONFIDENCE_KEYWORD_THRESHOLD);
    }

    #[test]
    fn test_heartbeat_with_jitter_shorter_than_ttl() {
        assert!((LOCK_HEARTBEAT_SECS as f64) * 1.1 < LOCK_TTL_SECS as f64);
    }

    #[test]
    fn test_known_mbti_outweighs_unknown() {
        assert!(MBTI_KNOWN_WEIGHT > MBTI_UNKNOWN_WEIGHT);
        assert!(TIME_DECAY_TAU_DAYS > 0.0);
    }
}
