//! Error types for mohe.

use thiserror::Error;

/// Result type alias using mohe's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for mohe operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Two vectors of different length were compared
    #[error("Vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// Keyword extraction / embedding service failed (transient)
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Lock store operation failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Operation exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may reasonably retry the same operation later.
    ///
    /// Extraction-service outages, network failures, timeouts and pool
    /// exhaustion are transient; data errors such as a dimension mismatch
    /// are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Embedding(_) | Error::Request(_) | Error::Timeout(_) => true,
            Error::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
