//! Mock keyword extractor for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mohe_inference::mock::MockKeywordExtractor;
//!
//! let extractor = MockKeywordExtractor::new();
//! let result = extractor.extract("quiet cafe", &ExtractionContext::Place).await?;
//! assert_eq!(result.vector.len(), 100);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use mohe_core::defaults::{MAX_SELECTED_KEYWORDS, VECTOR_DIMENSION};
use mohe_core::{
    Error, ExtractionContext, ExtractionResult, KeywordExtractor, KeywordId, Result,
    SelectedKeyword,
};

pub const MOCK_MODEL_NAME: &str = "mock-extractor";

/// Extractor that derives vectors from the characters of the input text.
///
/// The same text always produces the same vector and keywords. Keyword ids
/// are the vector position plus one.
#[derive(Debug, Clone)]
pub struct MockKeywordExtractor {
    dimension: usize,
    keywords_per_result: usize,
    unavailable: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockKeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockKeywordExtractor {
    pub fn new() -> Self {
        Self {
            dimension: VECTOR_DIMENSION,
            keywords_per_result: 5,
            unavailable: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_keywords_per_result(mut self, count: usize) -> Self {
        self.keywords_per_result = count.min(MAX_SELECTED_KEYWORDS);
        self
    }

    /// Simulate a service outage. Shared across clones.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Deterministic unit vector for `text`.
    pub fn vector_for(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0f32; dimension];
        if dimension == 0 {
            return vec;
        }
        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
        vec
    }

    fn keywords_for(&self, vector: &[f32]) -> Vec<SelectedKeyword> {
        let mut positions: Vec<(usize, f32)> = vector
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| *v > 0.0)
            .collect();
        positions.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        positions
            .into_iter()
            .take(self.keywords_per_result)
            .map(|(idx, value)| {
                let id = idx as KeywordId + 1;
                SelectedKeyword::new(id, format!("keyword_{id}"), f64::from(value))
            })
            .collect()
    }
}

#[async_trait]
impl KeywordExtractor for MockKeywordExtractor {
    async fn extract(&self, text: &str, context: &ExtractionContext) -> Result<ExtractionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Embedding("mock extraction service unavailable".into()));
        }

        // User context folds the trait tag into the text so tags change the vector.
        let seed = match context.mbti() {
            Some(mbti) => format!("{text} {mbti}"),
            None => text.to_string(),
        };
        let vector = Self::vector_for(&seed, self.dimension);
        let selected_keywords = self.keywords_for(&vector);

        Ok(ExtractionResult {
            vector,
            selected_keywords,
            model_name: MOCK_MODEL_NAME.to_string(),
            model_version: None,
        })
    }

    fn model_name(&self) -> &str {
        MOCK_MODEL_NAME
    }
}
