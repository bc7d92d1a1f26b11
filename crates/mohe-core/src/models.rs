//! Core data models for mohe.
//!
//! These types are shared across all mohe crates and represent the
//! vectors, similarity results, neighbor lists and job locks the
//! similarity core works with.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults::{LOCK_MAX_RETRIES, MAX_SELECTED_KEYWORDS};

/// Place primary key.
pub type PlaceId = i64;

/// User primary key.
pub type UserId = i64;

/// Keyword catalog primary key.
pub type KeywordId = i32;

// =============================================================================
// KEYWORDS
// =============================================================================

/// A catalog keyword selected for a vector, with the extractor's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedKeyword {
    pub keyword_id: KeywordId,
    pub keyword: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl SelectedKeyword {
    pub fn new(keyword_id: KeywordId, keyword: impl Into<String>, confidence: f64) -> Self {
        Self {
            keyword_id,
            keyword: keyword.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Distinct keyword ids whose confidence is at least `threshold`.
pub fn keyword_ids_at_least(keywords: &[SelectedKeyword], threshold: f64) -> BTreeSet<KeywordId> {
    keywords
        .iter()
        .filter(|k| k.confidence >= threshold)
        .map(|k| k.keyword_id)
        .collect()
}

/// Seed row of the keyword catalog. Read-only at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCatalogEntry {
    pub id: KeywordId,
    pub keyword: String,
    pub category: String,
    /// Index of this keyword inside a 100-dimensional vector.
    pub vector_position: i32,
}

// =============================================================================
// VECTORS
// =============================================================================

fn cap_keywords(mut keywords: Vec<SelectedKeyword>) -> Vec<SelectedKeyword> {
    keywords.truncate(MAX_SELECTED_KEYWORDS);
    keywords
}

/// A user's preference vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceVector {
    pub user_id: UserId,
    /// Store-assigned, increases on every regeneration. Used as a cache stamp.
    pub version: i64,
    pub vector: Vec<f32>,
    pub selected_keywords: Vec<SelectedKeyword>,
    pub model_name: String,
    pub model_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PreferenceVector {
    /// Build a fresh preference vector stamped with the current time.
    ///
    /// Keywords beyond [`MAX_SELECTED_KEYWORDS`] are dropped.
    pub fn new(
        user_id: UserId,
        vector: Vec<f32>,
        selected_keywords: Vec<SelectedKeyword>,
        model_name: impl Into<String>,
        model_version: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            version: 1,
            vector,
            selected_keywords: cap_keywords(selected_keywords),
            model_name: model_name.into(),
            model_version,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the vector contents after regeneration and bump the version.
    pub fn replace(
        &mut self,
        vector: Vec<f32>,
        selected_keywords: Vec<SelectedKeyword>,
        model_name: impl Into<String>,
        model_version: Option<String>,
    ) {
        self.vector = vector;
        self.selected_keywords = cap_keywords(selected_keywords);
        self.model_name = model_name.into();
        self.model_version = model_version;
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// A place's description vector. One active vector per place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionVector {
    pub place_id: PlaceId,
    pub version: i64,
    pub vector: Vec<f32>,
    pub selected_keywords: Vec<SelectedKeyword>,
    pub model_name: String,
    pub model_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DescriptionVector {
    pub fn new(
        place_id: PlaceId,
        vector: Vec<f32>,
        selected_keywords: Vec<SelectedKeyword>,
        model_name: impl Into<String>,
        model_version: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            place_id,
            version: 1,
            vector,
            selected_keywords: cap_keywords(selected_keywords),
            model_name: model_name.into(),
            model_version,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the vector contents after regeneration and bump the version.
    pub fn replace(
        &mut self,
        vector: Vec<f32>,
        selected_keywords: Vec<SelectedKeyword>,
        model_name: impl Into<String>,
        model_version: Option<String>,
    ) {
        self.vector = vector;
        self.selected_keywords = cap_keywords(selected_keywords);
        self.model_name = model_name.into();
        self.model_version = model_version;
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// SIMILARITY
// =============================================================================

/// Outcome of comparing a preference vector with a description vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// Cosine similarity in `[-1, 1]`.
    pub cosine: f64,
    /// Keyword Jaccard similarity in `[0, 1]`.
    pub jaccard: f64,
    /// L2 distance. Diagnostic only.
    pub euclidean: f64,
    /// 1.0 unless a trait rule matched.
    pub trait_boost_factor: f64,
    /// Capped weighted blend in `[0, 1]`.
    pub weighted_similarity: f64,
    pub common_keyword_count: usize,
    /// `common / MAX_SELECTED_KEYWORDS`, 0 when the place has no keywords.
    /// Absent only on cache rows written before the ratio was stored.
    pub keyword_overlap_ratio: Option<f64>,
}

/// A stored user-place similarity with the inputs it was computed from.
///
/// The trait tag is part of the inputs: the same pair scores differently
/// with and without a boost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSimilarity {
    pub user_id: UserId,
    pub place_id: PlaceId,
    pub result: SimilarityResult,
    /// Trait tag the result was scored with.
    pub trait_tag: Option<String>,
    pub calculated_at: DateTime<Utc>,
    pub user_vector_version: i64,
    pub place_vector_version: i64,
}

impl CachedSimilarity {
    pub fn new(
        user: &PreferenceVector,
        place: &DescriptionVector,
        trait_tag: Option<&str>,
        result: SimilarityResult,
    ) -> Self {
        Self {
            user_id: user.user_id,
            place_id: place.place_id,
            result,
            trait_tag: trait_tag.map(str::to_string),
            calculated_at: Utc::now(),
            user_vector_version: user.version,
            place_vector_version: place.version,
        }
    }

    /// True when both source versions and the trait tag still match and the
    /// entry is inside the freshness window.
    pub fn is_fresh(
        &self,
        user_version: i64,
        place_version: i64,
        trait_tag: Option<&str>,
        window: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        self.user_vector_version == user_version
            && self.place_vector_version == place_version
            && self.trait_tag.as_deref() == trait_tag
            && now - self.calculated_at <= window
    }
}

// =============================================================================
// TOP-K NEIGHBORS
// =============================================================================

/// One user's bookmark of a place, with the user's MBTI when on record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub user_id: UserId,
    pub place_id: PlaceId,
    pub user_mbti: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(user_id: UserId, place_id: PlaceId, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            place_id,
            user_mbti: None,
            created_at,
        }
    }

    pub fn with_mbti(mut self, mbti: impl Into<String>) -> Self {
        self.user_mbti = Some(mbti.into());
        self
    }

    /// True when the bookmarking user has a non-empty MBTI on record.
    pub fn has_mbti(&self) -> bool {
        self.user_mbti.as_deref().is_some_and(|m| !m.trim().is_empty())
    }
}

/// Pairwise signals between two places.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacePairSignal {
    pub place_id: PlaceId,
    pub neighbor_place_id: PlaceId,
    /// Time-decayed Jaccard over the users bookmarking each place.
    pub jaccard: f64,
    /// MBTI-weighted co-bookmark cosine floored to its bin, in `[0, 1]`.
    pub cosine_bin: f64,
    /// Description-vector cosine floored to its bin, in `[0, 1]`.
    pub description_cosine_bin: f64,
    pub co_occurrence_count: i64,
}

impl PlacePairSignal {
    /// True when no signal links the two places.
    pub fn is_empty(&self) -> bool {
        self.jaccard <= 0.0 && self.cosine_bin <= 0.0 && self.description_cosine_bin <= 0.0
    }
}

/// One ranked neighbor in a place's top-K list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopKEntry {
    pub place_id: PlaceId,
    pub neighbor_place_id: PlaceId,
    /// 1-based, contiguous per place.
    pub rank: i32,
    pub jaccard: f64,
    pub cosine_bin: f64,
    pub description_cosine_bin: f64,
    pub co_occurrence_count: i64,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// JOB LOCKS
// =============================================================================

/// Lifecycle state of a job lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LockStatus {
    Locked,
    Processing,
    Completed,
    Failed,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "LOCKED",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// LOCKED and PROCESSING rows hold a live lease.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Locked | Self::Processing)
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LockStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOCKED" => Ok(Self::Locked),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid lock status: {}", s)),
        }
    }
}

/// A claim on one chunk of a batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLock {
    pub job_name: String,
    pub chunk_id: String,
    pub worker_id: String,
    pub worker_host: String,
    pub status: LockStatus,
    pub locked_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobLock {
    /// A new LOCKED row owned by `worker_id`, expiring after `ttl`.
    pub fn claim(
        job_name: impl Into<String>,
        chunk_id: impl Into<String>,
        worker_id: impl Into<String>,
        worker_host: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_name: job_name.into(),
            chunk_id: chunk_id.into(),
            worker_id: worker_id.into(),
            worker_host: worker_host.into(),
            status: LockStatus::Locked,
            locked_at: now,
            started_at: None,
            completed_at: None,
            expires_at: now + ttl,
            retry_count: 0,
            max_retries: LOCK_MAX_RETRIES,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// FAILED with retries left.
    pub fn is_retryable(&self) -> bool {
        self.status == LockStatus::Failed && self.retry_count < self.max_retries
    }

    /// FAILED with no retries left.
    pub fn is_exhausted(&self) -> bool {
        self.status == LockStatus::Failed && self.retry_count >= self.max_retries
    }

    /// Holds a live lease whose deadline has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && self.expires_at < now
    }

    /// Take over a retryable FAILED row from `claim`. Keeps `retry_count`
    /// and `created_at` of the existing row.
    pub fn reclaim_from(&mut self, claim: &JobLock) {
        self.worker_id = claim.worker_id.clone();
        self.worker_host = claim.worker_host.clone();
        self.status = LockStatus::Locked;
        self.locked_at = claim.locked_at;
        self.started_at = None;
        self.completed_at = None;
        self.expires_at = claim.expires_at;
        self.updated_at = claim.updated_at;
    }
}

/// An owner-initiated status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockTransition {
    Processing,
    Completed,
    Failed { error: String },
}

impl LockTransition {
    pub fn target(&self) -> LockStatus {
        match self {
            Self::Processing => LockStatus::Processing,
            Self::Completed => LockStatus::Completed,
            Self::Failed { .. } => LockStatus::Failed,
        }
    }

    /// Whether a row currently in `status` may take this transition.
    pub fn allowed_from(&self, status: LockStatus) -> bool {
        match self {
            Self::Processing => status == LockStatus::Locked,
            Self::Completed | Self::Failed { .. } => status.is_active(),
        }
    }

    /// Apply the transition to `lock` at `now`.
    pub fn apply(&self, lock: &mut JobLock, now: DateTime<Utc>) {
        match self {
            Self::Processing => {
                lock.started_at = Some(now);
            }
            Self::Completed => {
                lock.completed_at = Some(now);
            }
            Self::Failed { error } => {
                lock.last_error = Some(error.clone());
                lock.retry_count += 1;
            }
        }
        lock.status = self.target();
        lock.updated_at = now;
    }
}

/// Per-job lock counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    pub job_name: String,
    pub locked: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    /// FAILED rows with no retries left. Subset of `failed`.
    pub exhausted: i64,
}

impl LockStats {
    pub fn from_locks<'a>(job_name: &str, locks: impl IntoIterator<Item = &'a JobLock>) -> Self {
        let mut stats = LockStats {
            job_name: job_name.to_string(),
            ..Default::default()
        };
        for lock in locks {
            match lock.status {
                LockStatus::Locked => stats.locked += 1,
                LockStatus::Processing => stats.processing += 1,
                LockStatus::Completed => stats.completed += 1,
                LockStatus::Failed => {
                    stats.failed += 1;
                    if lock.is_exhausted() {
                        stats.exhausted += 1;
                    }
                }
            }
        }
        stats
    }

    pub fn total(&self) -> i64 {
        self.locked + self.processing + self.completed + self.failed
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// What the text handed to the extraction service describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionContext {
    Place,
    User { mbti: Option<String> },
}

impl ExtractionContext {
    pub fn context_type(&self) -> &'static str {
        match self {
            Self::Place => "place",
            Self::User { .. } => "user",
        }
    }

    pub fn mbti(&self) -> Option<&str> {
        match self {
            Self::Place => None,
            Self::User { mbti } => mbti.as_deref(),
        }
    }
}

/// Vector and keywords returned by the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub vector: Vec<f32>,
    #[serde(default)]
    pub selected_keywords: Vec<SelectedKeyword>,
    pub model_name: String,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(id: KeywordId, confidence: f64) -> SelectedKeyword {
        SelectedKeyword::new(id, format!("kw{id}"), confidence)
    }

    #[test]
    fn test_keyword_ids_at_least_filters_and_dedups() {
        let keywords = vec![kw(1, 0.9), kw(1, 0.8), kw(2, 0.2), kw(3, 0.3)];
        let ids = keyword_ids_at_least(&keywords, 0.3);
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_selected_keyword_confidence_clamped() {
        assert_eq!(kw(1, 1.7).confidence, 1.0);
        assert_eq!(kw(1, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_description_vector_caps_keywords() {
        let keywords = (1..=20).map(|i| kw(i, 0.5)).collect();
        let v = DescriptionVector::new(1, vec![0.0; 100], keywords, "m", None);
        assert_eq!(v.selected_keywords.len(), MAX_SELECTED_KEYWORDS);
    }

    #[test]
    fn test_replace_bumps_version() {
        let mut v = PreferenceVector::new(1, vec![0.0; 100], vec![], "m", None);
        let before = v.version;
        v.replace(vec![1.0; 100], vec![kw(4, 0.6)], "m2", Some("2".into()));
        assert_eq!(v.version, before + 1);
        assert_eq!(v.model_name, "m2");
        assert!(v.updated_at >= v.created_at);
    }

    #[test]
    fn test_lock_status_round_trip_strings() {
        for status in [
            LockStatus::Locked,
            LockStatus::Processing,
            LockStatus::Completed,
            LockStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<LockStatus>().unwrap(), status);
        }
        assert!("paused".parse::<LockStatus>().is_err());
        assert_eq!("failed".parse::<LockStatus>().unwrap(), LockStatus::Failed);
    }

    #[test]
    fn test_lock_status_serde_uppercase() {
        let json = serde_json::to_string(&LockStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
    }

    #[test]
    fn test_claim_defaults() {
        let lock = JobLock::claim("embed", "chunk_1", "host-abcd1234", "host", Duration::minutes(10));
        assert_eq!(lock.status, LockStatus::Locked);
        assert_eq!(lock.retry_count, 0);
        assert_eq!(lock.max_retries, LOCK_MAX_RETRIES);
        assert_eq!(lock.expires_at - lock.locked_at, Duration::minutes(10));
        assert!(lock.started_at.is_none());
    }

    #[test]
    fn test_transition_rules() {
        assert!(LockTransition::Processing.allowed_from(LockStatus::Locked));
        assert!(!LockTransition::Processing.allowed_from(LockStatus::Processing));
        assert!(LockTransition::Completed.allowed_from(LockStatus::Locked));
        assert!(LockTransition::Completed.allowed_from(LockStatus::Processing));
        assert!(!LockTransition::Completed.allowed_from(LockStatus::Failed));
        let failed = LockTransition::Failed { error: "boom".into() };
        assert!(!failed.allowed_from(LockStatus::Completed));
    }

    #[test]
    fn test_failed_transition_increments_retry() {
        let mut lock = JobLock::claim("embed", "chunk_1", "w", "h", Duration::minutes(10));
        let now = Utc::now();
        LockTransition::Failed { error: "boom".into() }.apply(&mut lock, now);
        assert_eq!(lock.status, LockStatus::Failed);
        assert_eq!(lock.retry_count, 1);
        assert_eq!(lock.last_error.as_deref(), Some("boom"));
        assert!(lock.is_retryable());
    }

    #[test]
    fn test_reclaim_keeps_retry_count() {
        let mut lock = JobLock::claim("embed", "chunk_1", "w1", "h1", Duration::minutes(10));
        lock.status = LockStatus::Failed;
        lock.retry_count = 2;
        let claim = JobLock::claim("embed", "chunk_1", "w2", "h2", Duration::minutes(5));
        lock.reclaim_from(&claim);
        assert_eq!(lock.worker_id, "w2");
        assert_eq!(lock.status, LockStatus::Locked);
        assert_eq!(lock.retry_count, 2);
    }

    #[test]
    fn test_lock_stats_counts_exhausted() {
        let mut a = JobLock::claim("j", "a", "w", "h", Duration::minutes(1));
        a.status = LockStatus::Failed;
        a.retry_count = 3;
        let mut b = JobLock::claim("j", "b", "w", "h", Duration::minutes(1));
        b.status = LockStatus::Failed;
        b.retry_count = 1;
        let c = JobLock::claim("j", "c", "w", "h", Duration::minutes(1));
        let stats = LockStats::from_locks("j", [&a, &b, &c]);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.locked, 1);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_cached_similarity_freshness() {
        let user = PreferenceVector::new(1, vec![0.0; 100], vec![], "m", None);
        let place = DescriptionVector::new(2, vec![0.0; 100], vec![], "m", None);
        let result = SimilarityResult {
            cosine: 0.0,
            jaccard: 1.0,
            euclidean: 0.0,
            trait_boost_factor: 1.0,
            weighted_similarity: 0.3,
            common_keyword_count: 0,
            keyword_overlap_ratio: Some(0.0),
        };
        let cached = CachedSimilarity::new(&user, &place, None, result);
        let window = Duration::hours(24);
        assert!(cached.is_fresh(user.version, place.version, None, window, Utc::now()));
        assert!(!cached.is_fresh(user.version + 1, place.version, None, window, Utc::now()));
        assert!(!cached.is_fresh(
            user.version,
            place.version,
            None,
            window,
            Utc::now() + Duration::hours(25)
        ));
    }

    #[test]
    fn test_cached_similarity_tag_mismatch_is_stale() {
        let user = PreferenceVector::new(1, vec![0.0; 100], vec![], "m", None);
        let place = DescriptionVector::new(2, vec![0.0; 100], vec![], "m", None);
        let result = SimilarityResult {
            cosine: 0.5,
            jaccard: 0.5,
            euclidean: 1.0,
            trait_boost_factor: 1.2,
            weighted_similarity: 0.6,
            common_keyword_count: 1,
            keyword_overlap_ratio: Some(1.0 / 15.0),
        };
        let cached = CachedSimilarity::new(&user, &place, Some("INTJ"), result);
        let window = Duration::hours(24);
        let now = Utc::now();
        assert!(cached.is_fresh(user.version, place.version, Some("INTJ"), window, now));
        assert!(!cached.is_fresh(user.version, place.version, None, window, now));
        assert!(!cached.is_fresh(user.version, place.version, Some("ESFP"), window, now));
    }

    #[test]
    fn test_bookmark_mbti_presence() {
        let now = Utc::now();
        assert!(!Bookmark::new(1, 2, now).has_mbti());
        assert!(!Bookmark::new(1, 2, now).with_mbti("  ").has_mbti());
        assert!(Bookmark::new(1, 2, now).with_mbti("ENFP").has_mbti());
    }

    #[test]
    fn test_pair_signal_is_empty() {
        let mut signal = PlacePairSignal {
            place_id: 1,
            neighbor_place_id: 2,
            jaccard: 0.0,
            cosine_bin: 0.0,
            description_cosine_bin: 0.0,
            co_occurrence_count: 0,
        };
        assert!(signal.is_empty());
        signal.description_cosine_bin = 0.1;
        assert!(!signal.is_empty());
    }

    #[test]
    fn test_extraction_context_fields() {
        let user = ExtractionContext::User {
            mbti: Some("INFP".into()),
        };
        assert_eq!(user.context_type(), "user");
        assert_eq!(user.mbti(), Some("INFP"));
        assert_eq!(ExtractionContext::Place.mbti(), None);
    }
}
