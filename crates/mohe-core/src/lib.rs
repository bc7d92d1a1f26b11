//! # mohe-core
//!
//! Core types, traits, and abstractions for the mohe similarity engine.
//!
//! This crate provides the data model (vectors, similarity results, top-K
//! entries, job locks), the error type and the store traits that the other
//! mohe crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
