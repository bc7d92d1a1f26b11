//! In-memory store implementations.
//!
//! Used by tests across the workspace and by single-process deployments
//! that do not need PostgreSQL. Every store is `Clone`; clones share the
//! same state, so several coordinators built on clones of one
//! [`InMemoryLockStore`] behave like workers sharing one database.
//!
//! Each store guards its state with a single `tokio::sync::Mutex`, which
//! gives `try_claim`, `update_if_owner` and `replace_for_place` the same
//! atomicity as their PostgreSQL counterparts.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use mohe_core::defaults::LOCK_EXPIRED_ERROR;
use mohe_core::{
    Bookmark, BookmarkGraph, CachedSimilarity, DescriptionVector, Error, JobLock, KeywordCatalogEntry,
    KeywordCatalogRepository, LockStats, LockStatus, LockStore, LockTransition, PlaceId,
    PlaceTextSource, PreferenceVector, Result, SimilarityCache, TopKEntry, TopKStore, UserId,
    VectorStore,
};

fn unavailable(flag: &AtomicBool, store: &str) -> Result<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(Error::Internal(format!("{store} unavailable")));
    }
    Ok(())
}

// =============================================================================
// LOCKS
// =============================================================================

type LockKey = (String, String);

/// In-memory [`LockStore`].
#[derive(Clone, Default)]
pub struct InMemoryLockStore {
    locks: Arc<Mutex<BTreeMap<LockKey, JobLock>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a row as is. Test seeding.
    pub async fn insert(&self, lock: JobLock) {
        let key = (lock.job_name.clone(), lock.chunk_id.clone());
        self.locks.lock().await.insert(key, lock);
    }

    /// Make every subsequent call fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        unavailable(&self.unavailable, "lock store")
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_claim(&self, claim: &JobLock) -> Result<bool> {
        self.check()?;
        let mut locks = self.locks.lock().await;
        let key = (claim.job_name.clone(), claim.chunk_id.clone());
        match locks.get_mut(&key) {
            None => {
                locks.insert(key, claim.clone());
                Ok(true)
            }
            Some(existing) if existing.is_retryable() => {
                existing.reclaim_from(claim);
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn get(&self, job_name: &str, chunk_id: &str) -> Result<Option<JobLock>> {
        self.check()?;
        let locks = self.locks.lock().await;
        Ok(locks
            .get(&(job_name.to_string(), chunk_id.to_string()))
            .cloned())
    }

    async fn update_if_owner(
        &self,
        job_name: &str,
        chunk_id: &str,
        worker_id: &str,
        expected: LockStatus,
        transition: &LockTransition,
    ) -> Result<bool> {
        self.check()?;
        let mut locks = self.locks.lock().await;
        match locks.get_mut(&(job_name.to_string(), chunk_id.to_string())) {
            Some(lock) if lock.worker_id == worker_id && lock.status == expected => {
                transition.apply(lock, Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn renew(
        &self,
        job_name: &str,
        worker_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<u64> {
        self.check()?;
        let now = Utc::now();
        let mut locks = self.locks.lock().await;
        let mut renewed = 0;
        for lock in locks.values_mut().filter(|l| {
            l.job_name == job_name && l.worker_id == worker_id && l.status.is_active()
        }) {
            lock.expires_at = expires_at;
            lock.updated_at = now;
            renewed += 1;
        }
        Ok(renewed)
    }

    async fn expire_stale(&self, job_name: &str, now: DateTime<Utc>) -> Result<u64> {
        self.check()?;
        let mut locks = self.locks.lock().await;
        let mut expired = 0;
        for lock in locks
            .values_mut()
            .filter(|l| l.job_name == job_name && l.is_expired(now))
        {
            lock.status = LockStatus::Failed;
            lock.last_error = Some(LOCK_EXPIRED_ERROR.to_string());
            lock.updated_at = now;
            expired += 1;
        }
        Ok(expired)
    }

    async fn find_retryable(&self, job_name: &str, limit: i64) -> Result<Vec<JobLock>> {
        self.check()?;
        let locks = self.locks.lock().await;
        let mut retryable: Vec<JobLock> = locks
            .values()
            .filter(|l| l.job_name == job_name && l.is_retryable())
            .cloned()
            .collect();
        retryable.sort_by_key(|l| l.updated_at);
        retryable.truncate(limit.max(0) as usize);
        Ok(retryable)
    }

    async fn delete_completed_before(&self, job_name: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        self.check()?;
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, l| {
            !(l.job_name == job_name
                && l.status == LockStatus::Completed
                && l.completed_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - locks.len()) as u64)
    }

    async fn list(&self, job_name: &str) -> Result<Vec<JobLock>> {
        self.check()?;
        let locks = self.locks.lock().await;
        Ok(locks
            .values()
            .filter(|l| l.job_name == job_name)
            .cloned()
            .collect())
    }

    async fn list_for_worker(&self, worker_id: &str) -> Result<Vec<JobLock>> {
        self.check()?;
        let locks = self.locks.lock().await;
        Ok(locks
            .values()
            .filter(|l| l.worker_id == worker_id)
            .cloned()
            .collect())
    }

    async fn stats(&self, job_name: &str) -> Result<LockStats> {
        self.check()?;
        let locks = self.locks.lock().await;
        Ok(LockStats::from_locks(
            job_name,
            locks.values().filter(|l| l.job_name == job_name),
        ))
    }
}

// =============================================================================
// VECTORS
// =============================================================================

#[derive(Default)]
struct VectorState {
    preferences: HashMap<UserId, PreferenceVector>,
    descriptions: BTreeMap<PlaceId, DescriptionVector>,
}

/// In-memory [`VectorStore`].
#[derive(Clone, Default)]
pub struct InMemoryVectorStore {
    state: Arc<Mutex<VectorState>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn get_preference_vector(&self, user_id: UserId) -> Result<Option<PreferenceVector>> {
        Ok(self.state.lock().await.preferences.get(&user_id).cloned())
    }

    async fn get_description_vector(
        &self,
        place_id: PlaceId,
    ) -> Result<Option<DescriptionVector>> {
        Ok(self.state.lock().await.descriptions.get(&place_id).cloned())
    }

    async fn get_description_vectors(
        &self,
        place_ids: &[PlaceId],
    ) -> Result<Vec<DescriptionVector>> {
        let state = self.state.lock().await;
        let wanted: BTreeSet<PlaceId> = place_ids.iter().copied().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.descriptions.get(&id).cloned())
            .collect())
    }

    async fn upsert_preference_vector(&self, vector: &PreferenceVector) -> Result<i64> {
        let mut state = self.state.lock().await;
        let mut stored = vector.clone();
        if let Some(existing) = state.preferences.get(&vector.user_id) {
            stored.version = existing.version + 1;
            stored.created_at = existing.created_at;
        }
        let version = stored.version;
        state.preferences.insert(vector.user_id, stored);
        Ok(version)
    }

    async fn upsert_description_vector(&self, vector: &DescriptionVector) -> Result<i64> {
        let mut state = self.state.lock().await;
        let mut stored = vector.clone();
        if let Some(existing) = state.descriptions.get(&vector.place_id) {
            stored.version = existing.version + 1;
            stored.created_at = existing.created_at;
        }
        let version = stored.version;
        state.descriptions.insert(vector.place_id, stored);
        Ok(version)
    }

    async fn list_described_place_ids(&self) -> Result<Vec<PlaceId>> {
        Ok(self.state.lock().await.descriptions.keys().copied().collect())
    }

    async fn described_place_ids_in_range(
        &self,
        start: PlaceId,
        end: PlaceId,
    ) -> Result<Vec<PlaceId>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .state
            .lock()
            .await
            .descriptions
            .range(start..=end)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn count_described_places(&self) -> Result<i64> {
        Ok(self.state.lock().await.descriptions.len() as i64)
    }

    async fn described_place_id_bounds(&self) -> Result<Option<(PlaceId, PlaceId)>> {
        let state = self.state.lock().await;
        let min = state.descriptions.keys().next().copied();
        let max = state.descriptions.keys().next_back().copied();
        Ok(min.zip(max))
    }
}

// =============================================================================
// TOP-K
// =============================================================================

/// In-memory [`TopKStore`].
#[derive(Clone, Default)]
pub struct InMemoryTopKStore {
    lists: Arc<Mutex<HashMap<PlaceId, Vec<TopKEntry>>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryTopKStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of places with a stored list.
    pub async fn len(&self) -> usize {
        self.lists.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lists.lock().await.is_empty()
    }
}

#[async_trait]
impl TopKStore for InMemoryTopKStore {
    async fn replace_for_place(&self, place_id: PlaceId, entries: &[TopKEntry]) -> Result<()> {
        unavailable(&self.unavailable, "top-k store")?;
        let mut lists = self.lists.lock().await;
        if entries.is_empty() {
            lists.remove(&place_id);
        } else {
            lists.insert(place_id, entries.to_vec());
        }
        Ok(())
    }

    async fn get_for_place(&self, place_id: PlaceId) -> Result<Vec<TopKEntry>> {
        unavailable(&self.unavailable, "top-k store")?;
        let mut entries = self
            .lists
            .lock()
            .await
            .get(&place_id)
            .cloned()
            .unwrap_or_default();
        entries.sort_by_key(|e| e.rank);
        Ok(entries)
    }
}

// =============================================================================
// BOOKMARKS
// =============================================================================

/// In-memory [`BookmarkGraph`].
#[derive(Clone, Default)]
pub struct InMemoryBookmarkGraph {
    by_place: Arc<Mutex<BTreeMap<PlaceId, BTreeMap<UserId, DateTime<Utc>>>>>,
    mbti: Arc<Mutex<HashMap<UserId, String>>>,
}

impl InMemoryBookmarkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a bookmark made now. Idempotent.
    pub async fn add(&self, user_id: UserId, place_id: PlaceId) {
        self.add_at(user_id, place_id, Utc::now()).await;
    }

    /// Record a bookmark with an explicit creation time. Re-adding keeps the
    /// first timestamp.
    pub async fn add_at(&self, user_id: UserId, place_id: PlaceId, created_at: DateTime<Utc>) {
        self.by_place
            .lock()
            .await
            .entry(place_id)
            .or_default()
            .entry(user_id)
            .or_insert(created_at);
    }

    pub async fn remove(&self, user_id: UserId, place_id: PlaceId) {
        let mut by_place = self.by_place.lock().await;
        if let Some(users) = by_place.get_mut(&place_id) {
            users.remove(&user_id);
            if users.is_empty() {
                by_place.remove(&place_id);
            }
        }
    }

    pub async fn set_user_mbti(&self, user_id: UserId, mbti: impl Into<String>) {
        self.mbti.lock().await.insert(user_id, mbti.into());
    }
}

#[async_trait]
impl BookmarkGraph for InMemoryBookmarkGraph {
    async fn bookmarks_for_places(
        &self,
        place_ids: &[PlaceId],
    ) -> Result<HashMap<PlaceId, Vec<Bookmark>>> {
        let by_place = self.by_place.lock().await;
        let mbti = self.mbti.lock().await;
        Ok(place_ids
            .iter()
            .map(|place_id| {
                let bookmarks = by_place
                    .get(place_id)
                    .map(|users| {
                        users
                            .iter()
                            .map(|(user_id, created_at)| Bookmark {
                                user_id: *user_id,
                                place_id: *place_id,
                                user_mbti: mbti.get(user_id).cloned(),
                                created_at: *created_at,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                (*place_id, bookmarks)
            })
            .collect())
    }

    async fn places_for_user(&self, user_id: UserId) -> Result<Vec<PlaceId>> {
        Ok(self
            .by_place
            .lock()
            .await
            .iter()
            .filter(|(_, users)| users.contains_key(&user_id))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn co_bookmarked_places(&self, place_id: PlaceId) -> Result<Vec<PlaceId>> {
        let by_place = self.by_place.lock().await;
        let Some(target_users) = by_place.get(&place_id) else {
            return Ok(Vec::new());
        };
        Ok(by_place
            .iter()
            .filter(|(id, users)| {
                **id != place_id && users.keys().any(|u| target_users.contains_key(u))
            })
            .map(|(id, _)| *id)
            .collect())
    }
}

// =============================================================================
// SIMILARITY CACHE
// =============================================================================

/// In-memory [`SimilarityCache`].
#[derive(Clone, Default)]
pub struct InMemorySimilarityCache {
    entries: Arc<Mutex<HashMap<(UserId, PlaceId), CachedSimilarity>>>,
}

impl InMemorySimilarityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl SimilarityCache for InMemorySimilarityCache {
    async fn get(&self, user_id: UserId, place_id: PlaceId) -> Result<Option<CachedSimilarity>> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(user_id, place_id))
            .cloned())
    }

    async fn put(&self, entry: &CachedSimilarity) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert((entry.user_id, entry.place_id), entry.clone());
        Ok(())
    }

    async fn invalidate_user(&self, user_id: UserId) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|(user, _), _| *user != user_id);
        Ok((before - entries.len()) as u64)
    }

    async fn invalidate_place(&self, place_id: PlaceId) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|(_, place), _| *place != place_id);
        Ok((before - entries.len()) as u64)
    }
}

// =============================================================================
// KEYWORD CATALOG
// =============================================================================

/// In-memory [`KeywordCatalogRepository`] over a fixed list.
#[derive(Clone, Default)]
pub struct InMemoryKeywordCatalog {
    entries: Arc<Vec<KeywordCatalogEntry>>,
}

impl InMemoryKeywordCatalog {
    pub fn new(entries: Vec<KeywordCatalogEntry>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

#[async_trait]
impl KeywordCatalogRepository for InMemoryKeywordCatalog {
    async fn list_all(&self) -> Result<Vec<KeywordCatalogEntry>> {
        Ok(self.entries.as_ref().clone())
    }

    async fn find_by_keyword(&self, keyword: &str) -> Result<Option<KeywordCatalogEntry>> {
        Ok(self.entries.iter().find(|e| e.keyword == keyword).cloned())
    }
}

// =============================================================================
// PLACE TEXT
// =============================================================================

/// In-memory [`PlaceTextSource`].
#[derive(Clone, Default)]
pub struct InMemoryPlaceTextSource {
    texts: Arc<Mutex<BTreeMap<PlaceId, String>>>,
}

impl InMemoryPlaceTextSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, place_id: PlaceId, text: impl Into<String>) {
        self.texts.lock().await.insert(place_id, text.into());
    }
}

#[async_trait]
impl PlaceTextSource for InMemoryPlaceTextSource {
    async fn place_texts_in_range(
        &self,
        start: PlaceId,
        end: PlaceId,
    ) -> Result<Vec<(PlaceId, String)>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .texts
            .lock()
            .await
            .range(start..=end)
            .map(|(id, text)| (*id, text.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claim(chunk: &str, worker: &str) -> JobLock {
        JobLock::claim("embed", chunk, worker, "host", Duration::minutes(10))
    }

    #[tokio::test]
    async fn test_claim_is_insert_if_absent() {
        let store = InMemoryLockStore::new();
        assert!(store.try_claim(&claim("chunk_1", "w1")).await.unwrap());
        assert!(!store.try_claim(&claim("chunk_1", "w2")).await.unwrap());
        let lock = store.get("embed", "chunk_1").await.unwrap().unwrap();
        assert_eq!(lock.worker_id, "w1");
    }

    #[tokio::test]
    async fn test_claim_reclaims_retryable_failed_row() {
        let store = InMemoryLockStore::new();
        let mut failed = claim("chunk_1", "w1");
        failed.status = LockStatus::Failed;
        failed.retry_count = 1;
        store.insert(failed).await;

        assert!(store.try_claim(&claim("chunk_1", "w2")).await.unwrap());
        let lock = store.get("embed", "chunk_1").await.unwrap().unwrap();
        assert_eq!(lock.worker_id, "w2");
        assert_eq!(lock.status, LockStatus::Locked);
        assert_eq!(lock.retry_count, 1);
    }

    #[tokio::test]
    async fn test_claim_rejects_exhausted_row() {
        let store = InMemoryLockStore::new();
        let mut failed = claim("chunk_1", "w1");
        failed.status = LockStatus::Failed;
        failed.retry_count = failed.max_retries;
        store.insert(failed).await;

        assert!(!store.try_claim(&claim("chunk_1", "w2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_if_owner_checks_worker_and_status() {
        let store = InMemoryLockStore::new();
        store.try_claim(&claim("chunk_1", "w1")).await.unwrap();

        let foreign = store
            .update_if_owner("embed", "chunk_1", "w2", LockStatus::Locked, &LockTransition::Completed)
            .await
            .unwrap();
        assert!(!foreign);

        let stale = store
            .update_if_owner(
                "embed",
                "chunk_1",
                "w1",
                LockStatus::Processing,
                &LockTransition::Completed,
            )
            .await
            .unwrap();
        assert!(!stale);

        let ok = store
            .update_if_owner("embed", "chunk_1", "w1", LockStatus::Locked, &LockTransition::Processing)
            .await
            .unwrap();
        assert!(ok);
        let lock = store.get("embed", "chunk_1").await.unwrap().unwrap();
        assert_eq!(lock.status, LockStatus::Processing);
        assert!(lock.started_at.is_some());
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = InMemoryLockStore::new();
        store.set_unavailable(true);
        assert!(store.try_claim(&claim("chunk_1", "w1")).await.is_err());
        store.set_unavailable(false);
        assert!(store.try_claim(&claim("chunk_1", "w1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_vector_upsert_bumps_version() {
        let store = InMemoryVectorStore::new();
        let v = DescriptionVector::new(5, vec![0.1; 100], vec![], "m", None);
        assert_eq!(store.upsert_description_vector(&v).await.unwrap(), 1);
        assert_eq!(store.upsert_description_vector(&v).await.unwrap(), 2);
        let stored = store.get_description_vector(5).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_vector_range_and_bounds() {
        let store = InMemoryVectorStore::new();
        for id in [3, 7, 11] {
            let v = DescriptionVector::new(id, vec![0.1; 100], vec![], "m", None);
            store.upsert_description_vector(&v).await.unwrap();
        }
        assert_eq!(store.described_place_ids_in_range(4, 11).await.unwrap(), vec![7, 11]);
        assert_eq!(store.described_place_id_bounds().await.unwrap(), Some((3, 11)));
        assert_eq!(store.count_described_places().await.unwrap(), 3);
        assert!(store.described_place_ids_in_range(9, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_co_bookmarked_places() {
        let graph = InMemoryBookmarkGraph::new();
        graph.add(1, 10).await;
        graph.add(1, 11).await;
        graph.add(2, 12).await;
        assert_eq!(graph.co_bookmarked_places(10).await.unwrap(), vec![11]);
        assert!(graph.co_bookmarked_places(99).await.unwrap().is_empty());

        assert_eq!(graph.places_for_user(1).await.unwrap(), vec![10, 11]);
        assert!(graph.places_for_user(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bookmarks_carry_mbti_and_first_timestamp() {
        let graph = InMemoryBookmarkGraph::new();
        let first = Utc::now() - chrono::Duration::days(3);
        graph.add_at(1, 10, first).await;
        graph.add_at(1, 10, Utc::now()).await;
        graph.add(2, 10).await;
        graph.set_user_mbti(1, "ENFP").await;

        let bookmarks = graph.bookmarks_for_places(&[10, 99]).await.unwrap();
        assert!(bookmarks[&99].is_empty());
        let at_10 = &bookmarks[&10];
        assert_eq!(at_10.len(), 2);
        assert_eq!(at_10[0].user_id, 1);
        assert_eq!(at_10[0].created_at, first);
        assert!(at_10[0].has_mbti());
        assert!(!at_10[1].has_mbti());
    }

    #[tokio::test]
    async fn test_similarity_cache_invalidation() {
        let cache = InMemorySimilarityCache::new();
        let user = PreferenceVector::new(1, vec![0.0; 100], vec![], "m", None);
        for place_id in [10, 11] {
            let place = DescriptionVector::new(place_id, vec![0.0; 100], vec![], "m", None);
            let result = mohe_core::SimilarityResult {
                cosine: 0.0,
                jaccard: 1.0,
                euclidean: 0.0,
                trait_boost_factor: 1.0,
                weighted_similarity: 0.3,
                common_keyword_count: 0,
                keyword_overlap_ratio: None,
            };
            cache
                .put(&CachedSimilarity::new(&user, &place, None, result))
                .await
                .unwrap();
        }
        assert_eq!(cache.invalidate_place(10).await.unwrap(), 1);
        assert_eq!(cache.invalidate_user(1).await.unwrap(), 1);
        assert!(cache.is_empty().await);
    }
}
