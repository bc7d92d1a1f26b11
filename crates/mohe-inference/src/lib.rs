//! # mohe-inference
//!
//! Client for the keyword extraction service.
//!
//! This crate provides:
//! - [`HttpKeywordExtractor`], the HTTP client for `POST /extract`
//! - [`ExtractionConfig`] loaded from the environment
//! - A deterministic mock extractor (feature `mock`)
//!
//! # Feature Flags
//!
//! - `mock`: Enable [`mock::MockKeywordExtractor`] for downstream tests
//!
//! # Example
//!
//! ```rust,no_run
//! use mohe_inference::{ExtractionContext, HttpKeywordExtractor, KeywordExtractor};
//!
//! #[tokio::main]
//! async fn main() -> mohe_inference::Result<()> {
//!     let extractor = HttpKeywordExtractor::from_env()?;
//!     let result = extractor
//!         .extract("quiet cafe with good light", &ExtractionContext::Place)
//!         .await?;
//!     println!("{} keywords", result.selected_keywords.len());
//!     Ok(())
//! }
//! ```

pub mod extraction;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use mohe_core::*;

pub use extraction::{ExtractionConfig, HttpKeywordExtractor};
