//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for every cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The caller-supplied fetcher failed; nothing was stored
    #[error(transparent)]
    Fetch(anyhow::Error),

    /// A stored record could not be decoded
    #[error("Malformed record {key}: {reason}")]
    Decode { key: String, reason: String },

    /// The Redis backing store failed
    #[error("Backing store error: {0}")]
    Store(#[from] redis::RedisError),

    /// A non-Redis backing store failed
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    /// The operation's context was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CacheError {
    /// Builds a decode error for the record stored at `key`.
    pub fn decode(key: &str, reason: impl Into<String>) -> Self {
        CacheError::Decode {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
