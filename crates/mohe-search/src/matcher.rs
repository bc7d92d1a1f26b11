//! Cached user-to-place scoring.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::{debug, info, trace};

use mohe_core::defaults::SIMILARITY_CACHE_FRESH_HOURS;
use mohe_core::{
    CachedSimilarity, Error, PlaceId, Result, SimilarityCache, SimilarityResult, UserId,
    VectorStore,
};

use crate::similarity::SimilarityEngine;

/// A place scored for a user.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPlace {
    pub place_id: PlaceId,
    pub result: SimilarityResult,
}

/// Scores users against places, memoising results in a [`SimilarityCache`].
///
/// A cached entry is reused only while both vector versions and the trait
/// tag match and it is younger than the freshness window.
#[derive(Clone)]
pub struct PlaceMatcher {
    engine: SimilarityEngine,
    vectors: Arc<dyn VectorStore>,
    cache: Arc<dyn SimilarityCache>,
    fresh_window: Duration,
}

impl PlaceMatcher {
    pub fn new(
        engine: SimilarityEngine,
        vectors: Arc<dyn VectorStore>,
        cache: Arc<dyn SimilarityCache>,
    ) -> Self {
        Self {
            engine,
            vectors,
            cache,
            fresh_window: Duration::hours(SIMILARITY_CACHE_FRESH_HOURS),
        }
    }

    pub fn with_fresh_window(mut self, window: Duration) -> Self {
        self.fresh_window = window;
        self
    }

    pub fn engine(&self) -> &SimilarityEngine {
        &self.engine
    }

    /// Similarity between one user and one place.
    ///
    /// Returns `Error::NotFound` when either vector is missing.
    pub async fn calculate_user_place_similarity(
        &self,
        user_id: UserId,
        place_id: PlaceId,
        trait_tag: Option<&str>,
        use_cache: bool,
    ) -> Result<SimilarityResult> {
        let user = self
            .vectors
            .get_preference_vector(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("preference vector for user {user_id}")))?;
        let place = self
            .vectors
            .get_description_vector(place_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("description vector for place {place_id}")))?;

        if use_cache {
            if let Some(cached) = self.cache.get(user_id, place_id).await? {
                let now = Utc::now();
                if cached.is_fresh(user.version, place.version, trait_tag, self.fresh_window, now) {
                    trace!(
                        subsystem = "similarity",
                        component = "matcher",
                        user_id,
                        place_id,
                        "Similarity cache hit"
                    );
                    return Ok(cached.result);
                }
            }
        }

        let result = self.engine.score_vectors(&user, &place, trait_tag)?;
        self.cache
            .put(&CachedSimilarity::new(&user, &place, trait_tag, result))
            .await?;
        Ok(result)
    }

    /// Places most similar to a user, best first.
    ///
    /// Places whose pair fails to score are skipped. Results below
    /// `min_similarity` are dropped.
    pub async fn top_similar_places_for_user(
        &self,
        user_id: UserId,
        limit: usize,
        exclude: &[PlaceId],
        min_similarity: f64,
        trait_tag: Option<&str>,
    ) -> Result<Vec<ScoredPlace>> {
        let start = Instant::now();
        let user = self
            .vectors
            .get_preference_vector(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("preference vector for user {user_id}")))?;

        let excluded: HashSet<PlaceId> = exclude.iter().copied().collect();
        let place_ids: Vec<PlaceId> = self
            .vectors
            .list_described_place_ids()
            .await?
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .collect();
        let places = self.vectors.get_description_vectors(&place_ids).await?;

        let mut scored: Vec<ScoredPlace> = places
            .iter()
            .filter_map(|place| match self.engine.score_vectors(&user, place, trait_tag) {
                Ok(result) => Some(ScoredPlace {
                    place_id: place.place_id,
                    result,
                }),
                Err(e) => {
                    debug!(
                        subsystem = "similarity",
                        component = "matcher",
                        user_id,
                        place_id = place.place_id,
                        error = %e,
                        "Skipping place"
                    );
                    None
                }
            })
            .filter(|s| s.result.weighted_similarity >= min_similarity)
            .collect();

        scored.sort_by(|a, b| {
            b.result
                .weighted_similarity
                .total_cmp(&a.result.weighted_similarity)
                .then_with(|| a.place_id.cmp(&b.place_id))
        });
        scored.truncate(limit);

        info!(
            subsystem = "similarity",
            component = "matcher",
            op = "top_similar_places_for_user",
            user_id,
            candidate_count = places.len(),
            result_count = scored.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Scored places for user"
        );
        Ok(scored)
    }

    /// Drop cached scores for a user after their vector is regenerated.
    pub async fn invalidate_user(&self, user_id: UserId) -> Result<u64> {
        let removed = self.cache.invalidate_user(user_id).await?;
        debug!(
            subsystem = "similarity",
            component = "matcher",
            user_id,
            rows_affected = removed,
            "Invalidated cached similarities for user"
        );
        Ok(removed)
    }

    /// Drop cached scores for a place after its vector is regenerated.
    pub async fn invalidate_place(&self, place_id: PlaceId) -> Result<u64> {
        let removed = self.cache.invalidate_place(place_id).await?;
        debug!(
            subsystem = "similarity",
            component = "matcher",
            place_id,
            rows_affected = removed,
            "Invalidated cached similarities for place"
        );
        Ok(removed)
    }
}
