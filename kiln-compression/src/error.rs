//! Error types for compression operations

use thiserror::Error;

/// Errors that can occur while producing a compressed body
#[derive(Error, Debug)]
pub enum CompressionError {
    /// The deflate stream rejected input or could not be flushed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// Invalid compression level
    #[error("Invalid compression level: {0} (must be between {1} and {2})")]
    InvalidLevel(u32, u32, u32),

    /// Data was written after `finish()` without an intervening `reset()`
    #[error("Compressor already finished; call reset() before reuse")]
    AlreadyFinished,

    /// IO error during compression
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<flate2::CompressError> for CompressionError {
    fn from(err: flate2::CompressError) -> Self {
        CompressionError::CompressionFailed(err.to_string())
    }
}
