//! Core traits for mohe abstractions.
//!
//! These traits define the interfaces that concrete stores and service
//! clients must satisfy. `mohe-db` provides PostgreSQL and in-memory
//! implementations; `mohe-inference` provides the extraction client.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::*;

// =============================================================================
// VECTOR STORE
// =============================================================================

/// Storage for user preference vectors and place description vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Get a user's preference vector.
    async fn get_preference_vector(&self, user_id: UserId) -> Result<Option<PreferenceVector>>;

    /// Get a place's active description vector.
    async fn get_description_vector(&self, place_id: PlaceId)
        -> Result<Option<DescriptionVector>>;

    /// Get the description vectors for many places. Missing places are omitted.
    async fn get_description_vectors(
        &self,
        place_ids: &[PlaceId],
    ) -> Result<Vec<DescriptionVector>>;

    /// Insert or replace a preference vector. Returns the stored version.
    async fn upsert_preference_vector(&self, vector: &PreferenceVector) -> Result<i64>;

    /// Insert or replace a description vector. Returns the stored version.
    async fn upsert_description_vector(&self, vector: &DescriptionVector) -> Result<i64>;

    /// Ids of all places with a description vector, ascending.
    async fn list_described_place_ids(&self) -> Result<Vec<PlaceId>>;

    /// Ids of places with a description vector in `[start, end]`, ascending.
    async fn described_place_ids_in_range(
        &self,
        start: PlaceId,
        end: PlaceId,
    ) -> Result<Vec<PlaceId>>;

    /// Number of places with a description vector.
    async fn count_described_places(&self) -> Result<i64>;

    /// Smallest and largest described place id.
    async fn described_place_id_bounds(&self) -> Result<Option<(PlaceId, PlaceId)>>;
}

// =============================================================================
// LOCK STORE
// =============================================================================

/// Shared storage for job locks.
///
/// Implementations must make `try_claim` and `update_if_owner` atomic with
/// respect to every other caller of the same store, including callers in
/// other processes.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Insert `claim` if no row exists for its `(job_name, chunk_id)`, or take
    /// over an existing FAILED row whose `retry_count < max_retries`.
    ///
    /// Returns `true` when this call now owns the chunk.
    async fn try_claim(&self, claim: &JobLock) -> Result<bool>;

    /// Read one lock.
    async fn get(&self, job_name: &str, chunk_id: &str) -> Result<Option<JobLock>>;

    /// Apply `transition` only if the row is still owned by `worker_id` and
    /// still in `expected` status. Returns whether a row changed.
    async fn update_if_owner(
        &self,
        job_name: &str,
        chunk_id: &str,
        worker_id: &str,
        expected: LockStatus,
        transition: &LockTransition,
    ) -> Result<bool>;

    /// Move `expires_at` of this worker's LOCKED/PROCESSING rows to `expires_at`.
    async fn renew(&self, job_name: &str, worker_id: &str, expires_at: DateTime<Utc>)
        -> Result<u64>;

    /// Turn LOCKED/PROCESSING rows with `expires_at < now` into FAILED with the
    /// "Lock expired" error. Retry counts are unchanged.
    async fn expire_stale(&self, job_name: &str, now: DateTime<Utc>) -> Result<u64>;

    /// FAILED rows with retries left, oldest `updated_at` first.
    async fn find_retryable(&self, job_name: &str, limit: i64) -> Result<Vec<JobLock>>;

    /// Delete COMPLETED rows whose `completed_at` is before `cutoff`.
    async fn delete_completed_before(&self, job_name: &str, cutoff: DateTime<Utc>) -> Result<u64>;

    /// All locks of a job, ordered by chunk id.
    async fn list(&self, job_name: &str) -> Result<Vec<JobLock>>;

    /// All locks owned by a worker across jobs.
    async fn list_for_worker(&self, worker_id: &str) -> Result<Vec<JobLock>>;

    /// Per-status counts for a job.
    async fn stats(&self, job_name: &str) -> Result<LockStats>;
}

// =============================================================================
// TOP-K STORE
// =============================================================================

/// Storage for per-place neighbor lists.
#[async_trait]
pub trait TopKStore: Send + Sync {
    /// Atomically replace the whole neighbor list of `place_id`.
    ///
    /// Readers observe either the previous list or the new one, never a mix.
    async fn replace_for_place(&self, place_id: PlaceId, entries: &[TopKEntry]) -> Result<()>;

    /// Neighbor list of `place_id` ordered by rank.
    async fn get_for_place(&self, place_id: PlaceId) -> Result<Vec<TopKEntry>>;
}

// =============================================================================
// BOOKMARKS
// =============================================================================

/// Read access to user bookmarks, the source of co-occurrence signals.
#[async_trait]
pub trait BookmarkGraph: Send + Sync {
    /// Bookmarks of each place, one per user. Places with no bookmarks map
    /// to an empty list.
    async fn bookmarks_for_places(
        &self,
        place_ids: &[PlaceId],
    ) -> Result<HashMap<PlaceId, Vec<Bookmark>>>;

    /// Places bookmarked by `user_id`, ascending.
    async fn places_for_user(&self, user_id: UserId) -> Result<Vec<PlaceId>>;

    /// Places other than `place_id` bookmarked by at least one of its users.
    async fn co_bookmarked_places(&self, place_id: PlaceId) -> Result<Vec<PlaceId>>;
}

// =============================================================================
// SIMILARITY CACHE
// =============================================================================

/// Storage for computed user-place similarities.
#[async_trait]
pub trait SimilarityCache: Send + Sync {
    async fn get(&self, user_id: UserId, place_id: PlaceId) -> Result<Option<CachedSimilarity>>;

    async fn put(&self, entry: &CachedSimilarity) -> Result<()>;

    /// Drop all entries for a user. Returns the number removed.
    async fn invalidate_user(&self, user_id: UserId) -> Result<u64>;

    /// Drop all entries for a place. Returns the number removed.
    async fn invalidate_place(&self, place_id: PlaceId) -> Result<u64>;
}

// =============================================================================
// KEYWORD CATALOG
// =============================================================================

/// Read-only access to the keyword catalog seed data.
#[async_trait]
pub trait KeywordCatalogRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<KeywordCatalogEntry>>;

    async fn find_by_keyword(&self, keyword: &str) -> Result<Option<KeywordCatalogEntry>>;
}

// =============================================================================
// EXTERNAL SERVICES
// =============================================================================

/// Turns free text into a 100-dimensional keyword vector.
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract(&self, text: &str, context: &ExtractionContext) -> Result<ExtractionResult>;

    /// Name of the model reported in stored vectors.
    fn model_name(&self) -> &str;
}

/// Supplies the text describing each place for re-embedding.
#[async_trait]
pub trait PlaceTextSource: Send + Sync {
    /// `(place_id, text)` for every place in `[start, end]` with a description.
    async fn place_texts_in_range(
        &self,
        start: PlaceId,
        end: PlaceId,
    ) -> Result<Vec<(PlaceId, String)>>;
}
