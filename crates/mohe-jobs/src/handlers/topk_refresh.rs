//! Recompute neighbor lists for every described place in a chunk.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use mohe_core::VectorStore;
use mohe_search::TopKMaintainer;

use crate::handler::{ChunkContext, ChunkHandler, ChunkResult};

pub const TOPK_REFRESH_JOB: &str = "topk-refresh";

pub struct TopKRefreshHandler {
    maintainer: TopKMaintainer,
    vectors: Arc<dyn VectorStore>,
}

impl TopKRefreshHandler {
    pub fn new(maintainer: TopKMaintainer, vectors: Arc<dyn VectorStore>) -> Self {
        Self {
            maintainer,
            vectors,
        }
    }
}

#[async_trait]
impl ChunkHandler for TopKRefreshHandler {
    fn job_name(&self) -> &str {
        TOPK_REFRESH_JOB
    }

    async fn process(&self, ctx: ChunkContext) -> ChunkResult {
        let place_ids = match self
            .vectors
            .described_place_ids_in_range(ctx.range.start, ctx.range.end)
            .await
        {
            Ok(ids) => ids,
            Err(e) => return ChunkResult::Failed(format!("Failed to list places: {}", e)),
        };
        debug!(
            subsystem = "jobs",
            component = "topk_refresh",
            chunk_id = %ctx.chunk_id,
            candidate_count = place_ids.len(),
            "Refreshing chunk"
        );

        let summary = self.maintainer.refresh_topk_batch(&place_ids).await;
        if summary.failed > 0 {
            return ChunkResult::Failed(format!(
                "{} of {} places failed to refresh",
                summary.failed, summary.requested
            ));
        }
        ChunkResult::Success {
            processed: summary.refreshed,
        }
    }
}
