//! Error types for cache construction.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A cache was configured with room for zero entries
    #[error("Cache '{0}' must hold at least one entry")]
    ZeroCapacity(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
