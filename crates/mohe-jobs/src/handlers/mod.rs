//! Chunk handlers for mohe batch jobs.

pub mod embedding_refresh;
pub mod topk_refresh;

pub use embedding_refresh::{EmbeddingRefreshHandler, EMBEDDING_REFRESH_JOB};
pub use topk_refresh::{TopKRefreshHandler, TOPK_REFRESH_JOB};
