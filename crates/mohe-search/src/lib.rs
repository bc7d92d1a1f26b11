//! # mohe-search
//!
//! Similarity scoring and place-neighbor maintenance for mohe.
//!
//! This crate provides:
//! - User-to-place similarity (cosine, keyword Jaccard, trait boost)
//! - Place-to-place top-K neighbor lists from bookmarks and descriptions
//! - Cached user-to-place scoring and top-N lookup
//!
//! ## Example
//!
//! ```ignore
//! use mohe_search::{SimilarityEngine, TopKConfig, TopKMaintainer};
//! use mohe_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//! let maintainer = TopKMaintainer::new(
//!     SimilarityEngine::default(),
//!     Arc::new(db.vectors.clone()),
//!     Arc::new(db.bookmarks.clone()),
//!     Arc::new(db.topk.clone()),
//!     TopKConfig::from_env(),
//! );
//! let neighbors = maintainer.refresh_topk(place_id).await?;
//! ```

pub mod matcher;
pub mod similarity;
pub mod topk;
pub mod trait_boost;

// Re-export core types
pub use mohe_core::*;

pub use matcher::{PlaceMatcher, ScoredPlace};
pub use similarity::{
    cosine_similarity, euclidean_distance, jaccard_similarity, keyword_jaccard, SimilarityConfig,
    SimilarityEngine,
};
pub use topk::{
    bookmark_overlap, cosine_bin, rank_neighbors, BatchRefreshSummary, BookmarkOverlap,
    TopKConfig, TopKMaintainer,
};
pub use trait_boost::{TraitAxis, TraitBoostTable, TraitKeywordNames};
