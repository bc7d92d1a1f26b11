//! Top-K neighbor maintenance.
//!
//! For every place the maintainer keeps a ranked list of the most similar
//! other places. Three signals feed the ranking:
//!
//! - **jaccard**: overlap of the users who bookmarked each place, each
//!   common user discounted by `exp(-age_days / tau)` of the later bookmark
//! - **cosine_bin**: co-bookmark cosine `sum(w) / sqrt(|A| * |B|)` where a
//!   common user weighs more when their MBTI is known, floored to a bin
//! - **description_cosine_bin**: cosine of the two description vectors,
//!   floored to a bin. Lets places without bookmarks still find neighbors.
//!
//! `score = jaccard_weight * jaccard + cosine_weight * cosine_bin
//! + description_weight * description_cosine_bin`. Ties are broken by
//! co-occurrence count (descending) then neighbor id (ascending), so a
//! refresh over unchanged data always yields the same list.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mohe_core::defaults::{
    COSINE_BIN_WIDTH, MBTI_KNOWN_WEIGHT, MBTI_UNKNOWN_WEIGHT, TIME_DECAY_TAU_DAYS, TOPK,
    TOPK_BATCH_CONCURRENCY, TOPK_CANDIDATE_CUTOFF, TOPK_COSINE_WEIGHT, TOPK_DESCRIPTION_WEIGHT,
    TOPK_JACCARD_WEIGHT,
};
use mohe_core::{
    Bookmark, BookmarkGraph, DescriptionVector, PlaceId, PlacePairSignal, Result, TopKEntry,
    TopKStore, UserId, VectorStore,
};

use crate::similarity::SimilarityEngine;

/// Neighbor ranking configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TopKConfig {
    /// Neighbors kept per place.
    pub k: usize,
    /// Weight of the time-decayed co-bookmark Jaccard.
    pub jaccard_weight: f64,
    /// Weight of the binned co-bookmark cosine.
    pub cosine_weight: f64,
    /// Weight of the binned description cosine.
    pub description_weight: f64,
    /// Width of one cosine bin.
    pub cosine_bin_width: f64,
    /// Co-bookmark cosine weight of a common user with a known MBTI.
    pub mbti_known_weight: f64,
    /// Co-bookmark cosine weight of a common user without one.
    pub mbti_unknown_weight: f64,
    /// Jaccard decay constant in days. Zero or less disables decay.
    pub time_decay_tau_days: f64,
    /// All described places become candidates when there are at most this many.
    pub candidate_cutoff: usize,
    /// Places refreshed at once by [`TopKMaintainer::refresh_topk_batch`].
    pub batch_concurrency: usize,
}

impl Default for TopKConfig {
    fn default() -> Self {
        Self {
            k: TOPK,
            jaccard_weight: TOPK_JACCARD_WEIGHT,
            cosine_weight: TOPK_COSINE_WEIGHT,
            description_weight: TOPK_DESCRIPTION_WEIGHT,
            cosine_bin_width: COSINE_BIN_WIDTH,
            mbti_known_weight: MBTI_KNOWN_WEIGHT,
            mbti_unknown_weight: MBTI_UNKNOWN_WEIGHT,
            time_decay_tau_days: TIME_DECAY_TAU_DAYS,
            candidate_cutoff: TOPK_CANDIDATE_CUTOFF,
            batch_concurrency: TOPK_BATCH_CONCURRENCY,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl TopKConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// Reads `MOHE_TOPK`, `MOHE_WEIGHT_JACCARD`, `MOHE_WEIGHT_COSINE_BIN`,
    /// `MOHE_WEIGHT_DESCRIPTION_COSINE`, `MOHE_WEIGHT_MBTI_KNOWN`,
    /// `MOHE_WEIGHT_MBTI_UNKNOWN`, `MOHE_TIME_DECAY_TAU_DAYS`,
    /// `MOHE_TOPK_CANDIDATE_CUTOFF` and `MOHE_TOPK_BATCH_CONCURRENCY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            k: env_or("MOHE_TOPK", defaults.k).max(1),
            jaccard_weight: env_or("MOHE_WEIGHT_JACCARD", defaults.jaccard_weight),
            cosine_weight: env_or("MOHE_WEIGHT_COSINE_BIN", defaults.cosine_weight),
            description_weight: env_or(
                "MOHE_WEIGHT_DESCRIPTION_COSINE",
                defaults.description_weight,
            ),
            mbti_known_weight: env_or("MOHE_WEIGHT_MBTI_KNOWN", defaults.mbti_known_weight),
            mbti_unknown_weight: env_or("MOHE_WEIGHT_MBTI_UNKNOWN", defaults.mbti_unknown_weight),
            time_decay_tau_days: env_or("MOHE_TIME_DECAY_TAU_DAYS", defaults.time_decay_tau_days),
            candidate_cutoff: env_or("MOHE_TOPK_CANDIDATE_CUTOFF", defaults.candidate_cutoff),
            batch_concurrency: env_or("MOHE_TOPK_BATCH_CONCURRENCY", defaults.batch_concurrency)
                .max(1),
            ..defaults
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    pub fn with_weights(mut self, jaccard: f64, cosine: f64) -> Self {
        self.jaccard_weight = jaccard;
        self.cosine_weight = cosine;
        self
    }

    pub fn with_description_weight(mut self, weight: f64) -> Self {
        self.description_weight = weight;
        self
    }

    pub fn with_mbti_weights(mut self, known: f64, unknown: f64) -> Self {
        self.mbti_known_weight = known;
        self.mbti_unknown_weight = unknown;
        self
    }

    pub fn with_time_decay_tau_days(mut self, tau: f64) -> Self {
        self.time_decay_tau_days = tau;
        self
    }

    pub fn with_candidate_cutoff(mut self, cutoff: usize) -> Self {
        self.candidate_cutoff = cutoff;
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    /// Composite score of one pair.
    pub fn score(&self, signal: &PlacePairSignal) -> f64 {
        self.jaccard_weight * signal.jaccard
            + self.cosine_weight * signal.cosine_bin
            + self.description_weight * signal.description_cosine_bin
    }

    /// Decay factor of a co-bookmark whose later bookmark is `age_days` old.
    pub fn decay(&self, age_days: i64) -> f64 {
        if self.time_decay_tau_days <= 0.0 {
            return 1.0;
        }
        (-(age_days.max(0) as f64) / self.time_decay_tau_days).exp()
    }
}

/// Floor `cosine` to a multiple of `width`, clamped to `[0, 1]`.
pub fn cosine_bin(cosine: f64, width: f64) -> f64 {
    if !cosine.is_finite() || width <= 0.0 {
        return 0.0;
    }
    // Nudge before flooring so exact multiples such as 0.7 stay in their bin.
    let bins = (cosine / width + 1e-9).floor();
    (bins * width).clamp(0.0, 1.0)
}

/// Co-bookmark signals of two places before binning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookmarkOverlap {
    /// Time-decayed Jaccard, in `[0, 1]`.
    pub jaccard: f64,
    /// MBTI-weighted cosine, clamped to `[0, 1]`.
    pub cosine: f64,
    pub co_occurrence_count: i64,
}

/// Compare the bookmarks of two places as of `now`.
///
/// Both slices may hold at most one bookmark per user.
pub fn bookmark_overlap(
    a: &[Bookmark],
    b: &[Bookmark],
    config: &TopKConfig,
    now: DateTime<Utc>,
) -> BookmarkOverlap {
    let by_user: HashMap<UserId, &Bookmark> = b.iter().map(|bm| (bm.user_id, bm)).collect();

    let mut co_occurrence = 0i64;
    let mut decayed = 0.0;
    let mut weighted = 0.0;
    for bm_a in a {
        let Some(bm_b) = by_user.get(&bm_a.user_id) else {
            continue;
        };
        co_occurrence += 1;
        let latest = bm_a.created_at.max(bm_b.created_at);
        decayed += config.decay((now - latest).num_days());
        weighted += if bm_a.has_mbti() || bm_b.has_mbti() {
            config.mbti_known_weight
        } else {
            config.mbti_unknown_weight
        };
    }

    let union = a.len() + b.len() - co_occurrence as usize;
    let jaccard = if union == 0 {
        0.0
    } else {
        (decayed / union as f64).clamp(0.0, 1.0)
    };
    let cosine = if a.is_empty() || b.is_empty() {
        0.0
    } else {
        (weighted / ((a.len() * b.len()) as f64).sqrt()).clamp(0.0, 1.0)
    };

    BookmarkOverlap {
        jaccard,
        cosine,
        co_occurrence_count: co_occurrence,
    }
}

/// Rank pair signals into a top-K list for `place_id`.
///
/// Pairs with every signal zero are dropped. Ranks start at 1.
pub fn rank_neighbors(
    place_id: PlaceId,
    signals: Vec<PlacePairSignal>,
    config: &TopKConfig,
) -> Vec<TopKEntry> {
    let mut scored: Vec<(PlacePairSignal, f64)> = signals
        .into_iter()
        .filter(|s| s.neighbor_place_id != place_id)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let score = config.score(&s);
            (s, score)
        })
        .collect();

    scored.sort_by(|(a, score_a), (b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.co_occurrence_count.cmp(&a.co_occurrence_count))
            .then_with(|| a.neighbor_place_id.cmp(&b.neighbor_place_id))
    });
    scored.truncate(config.k);

    let now = Utc::now();
    scored
        .into_iter()
        .enumerate()
        .map(|(i, (s, score))| TopKEntry {
            place_id,
            neighbor_place_id: s.neighbor_place_id,
            rank: i as i32 + 1,
            jaccard: s.jaccard,
            cosine_bin: s.cosine_bin,
            description_cosine_bin: s.description_cosine_bin,
            co_occurrence_count: s.co_occurrence_count,
            score,
            updated_at: now,
        })
        .collect()
}

/// Outcome of a batch refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRefreshSummary {
    pub requested: usize,
    pub refreshed: usize,
    pub failed: usize,
    /// Neighbor rows written across all refreshed places.
    pub entries_written: usize,
    /// Places whose refresh failed.
    pub failed_place_ids: Vec<PlaceId>,
}

/// Maintains per-place neighbor lists.
#[derive(Clone)]
pub struct TopKMaintainer {
    engine: SimilarityEngine,
    vectors: Arc<dyn VectorStore>,
    bookmarks: Arc<dyn BookmarkGraph>,
    store: Arc<dyn TopKStore>,
    config: TopKConfig,
}

impl TopKMaintainer {
    pub fn new(
        engine: SimilarityEngine,
        vectors: Arc<dyn VectorStore>,
        bookmarks: Arc<dyn BookmarkGraph>,
        store: Arc<dyn TopKStore>,
        config: TopKConfig,
    ) -> Self {
        Self {
            engine,
            vectors,
            bookmarks,
            store,
            config,
        }
    }

    pub fn config(&self) -> &TopKConfig {
        &self.config
    }

    /// Binned cosine between two description vectors. Missing vectors and
    /// dimension mismatches yield 0.
    fn description_cosine_bin(
        &self,
        a: Option<&DescriptionVector>,
        b: Option<&DescriptionVector>,
    ) -> f64 {
        let (Some(a), Some(b)) = (a, b) else {
            return 0.0;
        };
        match self.engine.cosine(&a.vector, &b.vector) {
            Ok(cosine) => cosine_bin(cosine, self.config.cosine_bin_width),
            Err(e) => {
                debug!(
                    subsystem = "topk",
                    component = "maintainer",
                    place_id = a.place_id,
                    neighbor_place_id = b.place_id,
                    error = %e,
                    "Skipping description cosine for pair"
                );
                0.0
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn pair_signal(
        &self,
        place_id: PlaceId,
        neighbor_place_id: PlaceId,
        bookmarks_a: &[Bookmark],
        bookmarks_b: &[Bookmark],
        vector_a: Option<&DescriptionVector>,
        vector_b: Option<&DescriptionVector>,
        now: DateTime<Utc>,
    ) -> PlacePairSignal {
        let overlap = bookmark_overlap(bookmarks_a, bookmarks_b, &self.config, now);
        PlacePairSignal {
            place_id,
            neighbor_place_id,
            jaccard: overlap.jaccard,
            cosine_bin: cosine_bin(overlap.cosine, self.config.cosine_bin_width),
            description_cosine_bin: self.description_cosine_bin(vector_a, vector_b),
            co_occurrence_count: overlap.co_occurrence_count,
        }
    }

    /// Signals for a single pair of places.
    pub async fn compute_pair_signal(
        &self,
        place_id: PlaceId,
        neighbor_place_id: PlaceId,
    ) -> Result<PlacePairSignal> {
        let bookmarks = self
            .bookmarks
            .bookmarks_for_places(&[place_id, neighbor_place_id])
            .await?;
        let of = |id: PlaceId| bookmarks.get(&id).map(Vec::as_slice).unwrap_or_default();
        let vector_a = self.vectors.get_description_vector(place_id).await?;
        let vector_b = self.vectors.get_description_vector(neighbor_place_id).await?;

        Ok(self.pair_signal(
            place_id,
            neighbor_place_id,
            of(place_id),
            of(neighbor_place_id),
            vector_a.as_ref(),
            vector_b.as_ref(),
            Utc::now(),
        ))
    }

    async fn candidates(&self, place_id: PlaceId) -> Result<BTreeSet<PlaceId>> {
        let mut candidates: BTreeSet<PlaceId> = self
            .bookmarks
            .co_bookmarked_places(place_id)
            .await?
            .into_iter()
            .collect();

        let described = self.vectors.count_described_places().await?;
        if described.max(0) as usize <= self.config.candidate_cutoff {
            candidates.extend(self.vectors.list_described_place_ids().await?);
        }
        candidates.remove(&place_id);
        Ok(candidates)
    }

    /// Recompute and store the neighbor list of `place_id`.
    pub async fn refresh_topk(&self, place_id: PlaceId) -> Result<Vec<TopKEntry>> {
        let start = Instant::now();
        let candidates = self.candidates(place_id).await?;

        let mut ids: Vec<PlaceId> = Vec::with_capacity(candidates.len() + 1);
        ids.push(place_id);
        ids.extend(candidates.iter().copied());

        let bookmarks = self.bookmarks.bookmarks_for_places(&ids).await?;
        let vectors: HashMap<PlaceId, DescriptionVector> = self
            .vectors
            .get_description_vectors(&ids)
            .await?
            .into_iter()
            .map(|v| (v.place_id, v))
            .collect();

        let of = |id: PlaceId| bookmarks.get(&id).map(Vec::as_slice).unwrap_or_default();
        let target_vector = vectors.get(&place_id);
        let now = Utc::now();

        let signals: Vec<PlacePairSignal> = candidates
            .iter()
            .map(|neighbor| {
                self.pair_signal(
                    place_id,
                    *neighbor,
                    of(place_id),
                    of(*neighbor),
                    target_vector,
                    vectors.get(neighbor),
                    now,
                )
            })
            .collect();

        let entries = rank_neighbors(place_id, signals, &self.config);
        self.store.replace_for_place(place_id, &entries).await?;

        info!(
            subsystem = "topk",
            component = "maintainer",
            op = "refresh_topk",
            place_id,
            candidate_count = candidates.len(),
            result_count = entries.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Top-K refreshed"
        );
        Ok(entries)
    }

    /// Refresh many places concurrently. Individual failures are logged and
    /// counted; the batch always runs to the end.
    pub async fn refresh_topk_batch(&self, place_ids: &[PlaceId]) -> BatchRefreshSummary {
        let start = Instant::now();
        let mut summary = BatchRefreshSummary {
            requested: place_ids.len(),
            ..Default::default()
        };

        let mut results = stream::iter(place_ids.iter().copied())
            .map(|place_id| async move { (place_id, self.refresh_topk(place_id).await) })
            .buffer_unordered(self.config.batch_concurrency.max(1));

        while let Some((place_id, result)) = results.next().await {
            match result {
                Ok(entries) => {
                    summary.refreshed += 1;
                    summary.entries_written += entries.len();
                }
                Err(e) => {
                    warn!(
                        subsystem = "topk",
                        component = "maintainer",
                        op = "refresh_topk_batch",
                        place_id,
                        error = %e,
                        "Top-K refresh failed for place"
                    );
                    summary.failed += 1;
                    summary.failed_place_ids.push(place_id);
                }
            }
        }
        summary.failed_place_ids.sort_unstable();

        info!(
            subsystem = "topk",
            component = "maintainer",
            op = "refresh_topk_batch",
            requested = summary.requested,
            refreshed = summary.refreshed,
            failed = summary.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Top-K batch refresh finished"
        );
        summary
    }

    /// Places whose lists can change when `user_id` bookmarks `place_id`:
    /// the place, its co-bookmarked places and every place the user has
    /// bookmarked. Lookup failures shrink the set instead of failing.
    async fn affected_by_bookmark(&self, user_id: UserId, place_id: PlaceId) -> Vec<PlaceId> {
        let mut affected = BTreeSet::from([place_id]);

        match self.bookmarks.co_bookmarked_places(place_id).await {
            Ok(places) => affected.extend(places),
            Err(e) => warn!(
                subsystem = "topk",
                component = "maintainer",
                op = "refresh_after_bookmark",
                place_id,
                error = %e,
                "Could not list co-bookmarked places"
            ),
        }
        match self.bookmarks.places_for_user(user_id).await {
            Ok(places) => affected.extend(places),
            Err(e) => warn!(
                subsystem = "topk",
                component = "maintainer",
                op = "refresh_after_bookmark",
                user_id,
                error = %e,
                "Could not list places bookmarked by user"
            ),
        }
        affected.into_iter().collect()
    }

    /// Refresh every list a bookmark change can touch. Never fails; places
    /// whose refresh fails keep their previous list.
    pub async fn refresh_after_bookmark(
        &self,
        user_id: UserId,
        place_id: PlaceId,
    ) -> BatchRefreshSummary {
        let affected = self.affected_by_bookmark(user_id, place_id).await;
        let summary = self.refresh_topk_batch(&affected).await;
        if summary.failed > 0 {
            warn!(
                subsystem = "topk",
                component = "maintainer",
                op = "refresh_after_bookmark",
                user_id,
                place_id,
                failed = summary.failed,
                "Top-K refresh after bookmark failed, keeping previous lists"
            );
        }
        summary
    }
}
