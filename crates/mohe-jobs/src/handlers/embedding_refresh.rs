//! Regenerate place description vectors through the extraction service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use mohe_core::{
    DescriptionVector, ExtractionContext, KeywordExtractor, PlaceTextSource, SimilarityCache,
    VectorStore,
};

use crate::handler::{ChunkContext, ChunkHandler, ChunkResult};

pub const EMBEDDING_REFRESH_JOB: &str = "embedding-refresh";

pub struct EmbeddingRefreshHandler {
    extractor: Arc<dyn KeywordExtractor>,
    texts: Arc<dyn PlaceTextSource>,
    vectors: Arc<dyn VectorStore>,
    cache: Option<Arc<dyn SimilarityCache>>,
}

impl EmbeddingRefreshHandler {
    pub fn new(
        extractor: Arc<dyn KeywordExtractor>,
        texts: Arc<dyn PlaceTextSource>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            extractor,
            texts,
            vectors,
            cache: None,
        }
    }

    /// Invalidate cached user-to-place scores for every regenerated place.
    pub fn with_cache(mut self, cache: Arc<dyn SimilarityCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

#[async_trait]
impl ChunkHandler for EmbeddingRefreshHandler {
    fn job_name(&self) -> &str {
        EMBEDDING_REFRESH_JOB
    }

    async fn process(&self, ctx: ChunkContext) -> ChunkResult {
        let texts = match self
            .texts
            .place_texts_in_range(ctx.range.start, ctx.range.end)
            .await
        {
            Ok(texts) => texts,
            Err(e) => return ChunkResult::Failed(format!("Failed to load place texts: {}", e)),
        };

        let mut processed = 0;
        for (place_id, text) in texts {
            let extracted = match self.extractor.extract(&text, &ExtractionContext::Place).await {
                Ok(extracted) => extracted,
                // Service outage fails the whole chunk so it is retried later.
                Err(e) if e.is_transient() => {
                    return ChunkResult::Failed(format!("Extraction unavailable: {}", e));
                }
                Err(e) => {
                    warn!(
                        subsystem = "jobs",
                        component = "embedding_refresh",
                        place_id,
                        error = %e,
                        "Skipping place"
                    );
                    continue;
                }
            };

            let vector = DescriptionVector::new(
                place_id,
                extracted.vector,
                extracted.selected_keywords,
                extracted.model_name,
                extracted.model_version,
            );
            if let Err(e) = self.vectors.upsert_description_vector(&vector).await {
                return ChunkResult::Failed(format!("Failed to store vector: {}", e));
            }
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.invalidate_place(place_id).await {
                    warn!(
                        subsystem = "jobs",
                        component = "embedding_refresh",
                        place_id,
                        error = %e,
                        "Failed to invalidate cached similarities"
                    );
                }
            }
            processed += 1;
        }

        debug!(
            subsystem = "jobs",
            component = "embedding_refresh",
            chunk_id = %ctx.chunk_id,
            processed,
            "Chunk vectors regenerated"
        );
        ChunkResult::Success { processed }
    }
}
