//! Chunk handlers for each batch job.

use async_trait::async_trait;

use crate::chunks::ChunkRange;

/// Context provided to chunk handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkContext {
    pub job_name: String,
    pub chunk_id: String,
    /// Place ids covered by the chunk.
    pub range: ChunkRange,
    pub worker_id: String,
    /// Failed attempts before this one.
    pub retry_count: i32,
}

/// Result of processing one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkResult {
    /// Chunk finished; `processed` items were handled.
    Success { processed: usize },
    /// Chunk failed and may be retried.
    Failed(String),
}

/// Trait for chunk handlers.
#[async_trait]
pub trait ChunkHandler: Send + Sync {
    /// Job name used for lock rows.
    fn job_name(&self) -> &str;

    /// Process one chunk.
    async fn process(&self, ctx: ChunkContext) -> ChunkResult;
}

/// Handler that succeeds without doing anything.
pub struct NoOpChunkHandler {
    job_name: String,
}

impl NoOpChunkHandler {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
        }
    }
}

#[async_trait]
impl ChunkHandler for NoOpChunkHandler {
    fn job_name(&self) -> &str {
        &self.job_name
    }

    async fn process(&self, ctx: ChunkContext) -> ChunkResult {
        ChunkResult::Success {
            processed: ctx.range.len() as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_handler() {
        let handler = NoOpChunkHandler::new("noop");
        assert_eq!(handler.job_name(), "noop");

        let ctx = ChunkContext {
            job_name: "noop".into(),
            chunk_id: "place_1-10".into(),
            range: ChunkRange::new(1, 10).unwrap(),
            worker_id: "host-1234abcd".into(),
            retry_count: 0,
        };
        assert_eq!(
            handler.process(ctx).await,
            ChunkResult::Success { processed: 10 }
        );
    }
}
