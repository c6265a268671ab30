//! Error types for the side input cache
//!
//! Only construction failures reach callers as errors. Everything that can go
//! wrong on the data path is reported through metrics and tracing instead.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Configuration error - the cache cannot be constructed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A cached value could not be (re)initialized
    #[error("Failed to initialize reusable input: {0}")]
    InitFailure(String),

    /// A cached value failed to release its resources on reset
    #[error("Failed to release reusable input: {0}")]
    ReleaseFailure(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}
