//! User-to-place similarity scoring.
//!
//! Combines cosine similarity of the 100-dimensional vectors with a Jaccard
//! overlap of confident keywords, then applies the trait boost and caps the
//! blend to `[0, 1]`:
//!
//! ```text
//! weighted = clamp((cosine_weight * cosine + jaccard_weight * jaccard) * boost, 0, 1)
//! ```
//!
//! The engine is pure and holds no I/O handles. Clones share the trait table.

use std::collections::BTreeSet;
use std::sync::Arc;

use mohe_core::defaults::{
    COSINE_WEIGHT, CROSS_ENTITY_KEYWORD_THRESHOLD, HIGH_CONFIDENCE_KEYWORD_THRESHOLD,
    KEYWORD_JACCARD_WEIGHT, MAX_SELECTED_KEYWORDS, NO_TRAIT_BOOST, TRAIT_BOOST,
    TRAIT_KEYWORD_THRESHOLD, VECTOR_DIMENSION, WEIGHTED_SIMILARITY_CAP,
};
use mohe_core::{
    keyword_ids_at_least, DescriptionVector, Error, KeywordId, PreferenceVector, Result,
    SelectedKeyword, SimilarityResult,
};

use crate::trait_boost::TraitBoostTable;

/// Cosine similarity. Returns 0.0 when either vector has zero norm.
///
/// Callers are responsible for checking that lengths match.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    if cosine.is_finite() {
        cosine.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// L2 distance.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Jaccard similarity of two id sets. Two empty sets are identical (1.0).
pub fn jaccard_similarity<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Jaccard similarity over distinct keyword ids with confidence at least `threshold`.
pub fn keyword_jaccard(a: &[SelectedKeyword], b: &[SelectedKeyword], threshold: f64) -> f64 {
    jaccard_similarity(
        &keyword_ids_at_least(a, threshold),
        &keyword_ids_at_least(b, threshold),
    )
}

/// Scoring weights and thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityConfig {
    /// Weight of cosine similarity in the composite.
    pub cosine_weight: f64,
    /// Weight of keyword Jaccard in the composite.
    pub keyword_jaccard_weight: f64,
    /// Multiplier when a trait rule matches.
    pub trait_boost: f64,
    /// Minimum confidence for keywords in the Jaccard comparison.
    pub keyword_threshold: f64,
    /// Minimum confidence for place keywords considered by the trait boost.
    pub trait_keyword_threshold: f64,
    /// Required vector length.
    pub dimension: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            cosine_weight: COSINE_WEIGHT,
            keyword_jaccard_weight: KEYWORD_JACCARD_WEIGHT,
            trait_boost: TRAIT_BOOST,
            keyword_threshold: CROSS_ENTITY_KEYWORD_THRESHOLD,
            trait_keyword_threshold: TRAIT_KEYWORD_THRESHOLD,
            dimension: VECTOR_DIMENSION,
        }
    }
}

impl SimilarityConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// Reads `MOHE_WEIGHT_COSINE`, `MOHE_WEIGHT_JACCARD_KEYWORDS` and
    /// `MOHE_TRAIT_BOOST`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |name: &str, default: f64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(default)
        };
        Self {
            cosine_weight: read("MOHE_WEIGHT_COSINE", defaults.cosine_weight),
            keyword_jaccard_weight: read(
                "MOHE_WEIGHT_JACCARD_KEYWORDS",
                defaults.keyword_jaccard_weight,
            ),
            trait_boost: read("MOHE_TRAIT_BOOST", defaults.trait_boost),
            ..defaults
        }
    }

    pub fn with_weights(mut self, cosine: f64, keyword_jaccard: f64) -> Self {
        self.cosine_weight = cosine;
        self.keyword_jaccard_weight = keyword_jaccard;
        self
    }

    pub fn with_trait_boost(mut self, boost: f64) -> Self {
        self.trait_boost = boost;
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

/// Pure user-to-place similarity scorer.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    config: SimilarityConfig,
    traits: Arc<TraitBoostTable>,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::new(SimilarityConfig::default(), TraitBoostTable::legacy())
    }
}

impl SimilarityEngine {
    pub fn new(config: SimilarityConfig, traits: TraitBoostTable) -> Self {
        Self {
            config,
            traits: Arc::new(traits),
        }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    pub fn trait_table(&self) -> &TraitBoostTable {
        &self.traits
    }

    /// Reject vectors of different length or of the wrong dimension.
    pub fn check_dimensions(&self, a: &[f32], b: &[f32]) -> Result<()> {
        if a.len() != b.len() {
            return Err(Error::DimensionMismatch {
                left: a.len(),
                right: b.len(),
            });
        }
        if a.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                left: a.len(),
                right: self.config.dimension,
            });
        }
        Ok(())
    }

    /// Cosine similarity of two vectors after the dimension check.
    pub fn cosine(&self, a: &[f32], b: &[f32]) -> Result<f64> {
        self.check_dimensions(a, b)?;
        Ok(cosine_similarity(a, b))
    }

    /// Boost multiplier for a trait tag and the place's keywords.
    pub fn trait_boost_factor(
        &self,
        trait_tag: Option<&str>,
        place_keywords: &[SelectedKeyword],
    ) -> f64 {
        let Some(tag) = trait_tag.filter(|t| !t.is_empty()) else {
            return NO_TRAIT_BOOST;
        };
        let place_ids = keyword_ids_at_least(place_keywords, self.config.trait_keyword_threshold);
        match self.traits.matching_axis(tag, &place_ids) {
            Some(_) => self.config.trait_boost,
            None => NO_TRAIT_BOOST,
        }
    }

    /// Score a user vector against a place vector.
    pub fn score(
        &self,
        user_vec: &[f32],
        place_vec: &[f32],
        user_keywords: &[SelectedKeyword],
        place_keywords: &[SelectedKeyword],
        trait_tag: Option<&str>,
    ) -> Result<SimilarityResult> {
        self.check_dimensions(user_vec, place_vec)?;

        let cosine = cosine_similarity(user_vec, place_vec);
        let user_ids = keyword_ids_at_least(user_keywords, self.config.keyword_threshold);
        let place_ids = keyword_ids_at_least(place_keywords, self.config.keyword_threshold);
        let jaccard = jaccard_similarity(&user_ids, &place_ids);
        let euclidean = euclidean_distance(user_vec, place_vec);
        let trait_boost_factor = self.trait_boost_factor(trait_tag, place_keywords);

        let blend = self.config.cosine_weight * cosine + self.config.keyword_jaccard_weight * jaccard;
        let weighted_similarity = (blend * trait_boost_factor)
            .min(WEIGHTED_SIMILARITY_CAP)
            .max(0.0);

        let common_keyword_count = user_ids.intersection(&place_ids).count();
        let keyword_overlap_ratio = if place_keywords.is_empty() {
            0.0
        } else {
            common_keyword_count as f64 / MAX_SELECTED_KEYWORDS as f64
        };

        Ok(SimilarityResult {
            cosine,
            jaccard,
            euclidean,
            trait_boost_factor,
            weighted_similarity,
            common_keyword_count,
            keyword_overlap_ratio: Some(keyword_overlap_ratio),
        })
    }

    /// Score stored vectors.
    pub fn score_vectors(
        &self,
        user: &PreferenceVector,
        place: &DescriptionVector,
        trait_tag: Option<&str>,
    ) -> Result<SimilarityResult> {
        self.score(
            &user.vector,
            &place.vector,
            &user.selected_keywords,
            &place.selected_keywords,
            trait_tag,
        )
    }

    /// Names of the place keywords shared with the user, in place order.
    pub fn common_keywords(
        &self,
        user_keywords: &[SelectedKeyword],
        place_keywords: &[SelectedKeyword],
    ) -> Vec<String> {
        let user_ids = keyword_ids_at_least(user_keywords, self.config.keyword_threshold);
        let mut seen: BTreeSet<KeywordId> = BTreeSet::new();
        place_keywords
            .iter()
            .filter(|k| k.confidence >= self.config.keyword_threshold)
            .filter(|k| user_ids.contains(&k.keyword_id) && seen.insert(k.keyword_id))
            .map(|k| k.keyword.clone())
            .collect()
    }

    /// Keywords at or above the high-confidence threshold.
    pub fn high_confidence_keywords<'a>(
        &self,
        keywords: &'a [SelectedKeyword],
    ) -> Vec<&'a SelectedKeyword> {
        keywords
            .iter()
            .filter(|k| k.confidence >= HIGH_CONFIDENCE_KEYWORD_THRESHOLD)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(id: KeywordId, confidence: f64) -> SelectedKeyword {
        SelectedKeyword::new(id, format!("kw{id}"), confidence)
    }

    fn one_hot(index: usize) -> Vec<f32> {
        let mut v = vec![0.0; VECTOR_DIMENSION];
        v[index] = 1.0;
        v
    }

    #[test]
    fn test_identical_one_hot_vectors() {
        let engine = SimilarityEngine::default();
        let v = one_hot(3);
        let result = engine.score(&v, &v, &[], &[], None).unwrap();
        assert!((result.cosine - 1.0).abs() < 1e-9);
        assert_eq!(result.euclidean, 0.0);
        // Both keyword sets empty.
        assert_eq!(result.jaccard, 1.0);
        assert!((result.weighted_similarity - 1.0).abs() < 1e-9);
        // Computed as zero, not missing, when the place has no keywords.
        assert_eq!(result.keyword_overlap_ratio, Some(0.0));
        assert_eq!(result.common_keyword_count, 0);
    }

    #[test]
    fn test_zero_vector_cosine_is_zero() {
        let engine = SimilarityEngine::default();
        let zero = vec![0.0; VECTOR_DIMENSION];
        let result = engine.score(&one_hot(0), &zero, &[], &[], None).unwrap();
        assert_eq!(result.cosine, 0.0);
        assert!((result.weighted_similarity - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_jaccard_one_third() {
        let a = vec![kw(1, 0.9), kw(2, 0.9)];
        let b = vec![kw(1, 0.9), kw(3, 0.9)];
        let j = keyword_jaccard(&a, &b, CROSS_ENTITY_KEYWORD_THRESHOLD);
        assert!((j - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_keywords_ignored() {
        let a = vec![kw(1, 0.9), kw(2, 0.1)];
        let b = vec![kw(1, 0.9)];
        assert_eq!(keyword_jaccard(&a, &b, CROSS_ENTITY_KEYWORD_THRESHOLD), 1.0);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let engine = SimilarityEngine::default();
        let err = engine
            .score(&vec![0.1; 100], &vec![0.1; 99], &[], &[], None)
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { left: 100, right: 99 }));
    }

    #[test]
    fn test_wrong_dimension_rejected_even_when_equal() {
        let engine = SimilarityEngine::default();
        let err = engine
            .score(&vec![0.1; 10], &vec![0.1; 10], &[], &[], None)
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { left: 10, right: 100 }));
    }

    #[test]
    fn test_trait_boost_applied_and_capped() {
        let engine = SimilarityEngine::default();
        let user = one_hot(1);
        let mut place = one_hot(1);
        place[2] = 1.0;
        let place_keywords = vec![kw(16, 0.8)];

        let plain = engine
            .score(&user, &place, &[], &place_keywords, None)
            .unwrap();
        let boosted = engine
            .score(&user, &place, &[], &place_keywords, Some("INTJ"))
            .unwrap();
        assert_eq!(plain.trait_boost_factor, 1.0);
        assert_eq!(boosted.trait_boost_factor, 1.2);
        let expected = (plain.weighted_similarity * 1.2).min(1.0);
        assert!((boosted.weighted_similarity - expected).abs() < 1e-9);
    }

    #[test]
    fn test_trait_keyword_below_threshold_not_boosted() {
        let engine = SimilarityEngine::default();
        assert_eq!(engine.trait_boost_factor(Some("INTJ"), &[kw(16, 0.35)]), 1.0);
        assert_eq!(engine.trait_boost_factor(Some("INTJ"), &[kw(16, 0.4)]), 1.2);
        assert_eq!(engine.trait_boost_factor(Some(""), &[kw(16, 0.9)]), 1.0);
    }

    #[test]
    fn test_negative_components_floor_at_zero() {
        let engine = SimilarityEngine::default();
        let a = one_hot(0);
        let b: Vec<f32> = a.iter().map(|x| -x).collect();
        let user_kw = vec![kw(1, 0.9)];
        let place_kw = vec![kw(2, 0.9)];
        let result = engine.score(&a, &b, &user_kw, &place_kw, None).unwrap();
        assert!((result.cosine + 1.0).abs() < 1e-9);
        assert_eq!(result.weighted_similarity, 0.0);
    }

    #[test]
    fn test_overlap_ratio_and_common_keywords() {
        let engine = SimilarityEngine::default();
        let user_kw = vec![kw(1, 0.9), kw(2, 0.9), kw(3, 0.2)];
        let place_kw = vec![kw(2, 0.8), kw(1, 0.5), kw(3, 0.9)];
        let result = engine
            .score(&one_hot(0), &one_hot(0), &user_kw, &place_kw, None)
            .unwrap();
        assert_eq!(result.common_keyword_count, 2);
        assert_eq!(result.keyword_overlap_ratio, Some(2.0 / 15.0));
        assert_eq!(
            engine.common_keywords(&user_kw, &place_kw),
            vec!["kw2".to_string(), "kw1".to_string()]
        );
    }

    #[test]
    fn test_high_confidence_keywords() {
        let engine = SimilarityEngine::default();
        let keywords = vec![kw(1, 0.45), kw(2, 0.5), kw(3, 0.9)];
        let high: Vec<KeywordId> = engine
            .high_confidence_keywords(&keywords)
            .into_iter()
            .map(|k| k.keyword_id)
            .collect();
        assert_eq!(high, vec![2, 3]);
    }

    #[test]
    fn test_config_builders() {
        let config = SimilarityConfig::default()
            .with_weights(0.5, 0.5)
            .with_trait_boost(1.5)
            .with_dimension(8);
        assert_eq!(config.cosine_weight, 0.5);
        assert_eq!(config.trait_boost, 1.5);
        assert_eq!(config.dimension, 8);
    }

    #[test]
    fn test_engine_is_send_sync_clone() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<SimilarityEngine>();
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn vector() -> impl Strategy<Value = Vec<f32>> {
            proptest::collection::vec(-1.0f32..1.0, VECTOR_DIMENSION)
        }

        fn keywords() -> impl Strategy<Value = Vec<SelectedKeyword>> {
            proptest::collection::vec((1i32..=100, 0.0f64..=1.0), 0..15)
                .prop_map(|v| v.into_iter().map(|(id, c)| kw(id, c)).collect())
        }

        proptest! {
            #[test]
            fn prop_weighted_in_unit_range(
                a in vector(),
                b in vector(),
                ka in keywords(),
                kb in keywords(),
                tag in proptest::option::of("[IE][NS][TF][JP]"),
            ) {
                let engine = SimilarityEngine::default();
                let r = engine.score(&a, &b, &ka, &kb, tag.as_deref()).unwrap();
                prop_assert!((0.0..=1.0).contains(&r.weighted_similarity));
                prop_assert!((-1.0..=1.0).contains(&r.cosine));
                prop_assert!((0.0..=1.0).contains(&r.jaccard));
                prop_assert!(r.euclidean >= 0.0);
            }

            #[test]
            fn prop_self_cosine_is_one(a in vector()) {
                prop_assume!(a.iter().any(|x| x.abs() > 1e-3));
                prop_assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
            }

            #[test]
            fn prop_jaccard_symmetric(ka in keywords(), kb in keywords()) {
                let ab = keyword_jaccard(&ka, &kb, CROSS_ENTITY_KEYWORD_THRESHOLD);
                let ba = keyword_jaccard(&kb, &ka, CROSS_ENTITY_KEYWORD_THRESHOLD);
                prop_assert!((ab - ba).abs() < 1e-12);
            }
        }
    }
}
