//! Error types for the engine

use crate::Status;
use thiserror::Error;

/// Ways a request head or body can break the wire contract.
///
/// Each maps to a status-only response; no handler ever sees these requests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("request line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("more than {limit} request head lines")]
    TooManyHeaders { limit: usize },

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("unsupported method: {0}")]
    UnknownMethod(String),

    #[error("malformed query string: {0}")]
    MalformedQuery(String),

    #[error("missing or invalid Content-Length")]
    InvalidContentLength,

    #[error("body of {length} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { length: usize, limit: usize },

    #[error("connection closed mid-request")]
    UnexpectedEof,
}

impl ProtocolViolation {
    /// Status sent back for this violation
    pub fn status(&self) -> Status {
        match self {
            ProtocolViolation::LineTooLong { .. }
            | ProtocolViolation::TooManyHeaders { .. }
            | ProtocolViolation::BodyTooLarge { .. } => Status::PayloadTooLarge,
            ProtocolViolation::UnsupportedVersion(_) => Status::HttpVersionNotSupported,
            ProtocolViolation::MalformedRequestLine
            | ProtocolViolation::UnknownMethod(_)
            | ProtocolViolation::MalformedQuery(_)
            | ProtocolViolation::InvalidContentLength
            | ProtocolViolation::UnexpectedEof => Status::BadRequest,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolViolation::LineTooLong { .. } => "line_too_long",
            ProtocolViolation::TooManyHeaders { .. } => "too_many_headers",
            ProtocolViolation::UnsupportedVersion(_) => "unsupported_version",
            ProtocolViolation::MalformedRequestLine => "malformed_request_line",
            ProtocolViolation::UnknownMethod(_) => "unknown_method",
            ProtocolViolation::MalformedQuery(_) => "malformed_query",
            ProtocolViolation::InvalidContentLength => "invalid_content_length",
            ProtocolViolation::BodyTooLarge { .. } => "body_too_large",
            ProtocolViolation::UnexpectedEof => "unexpected_eof",
        }
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("Duplicate route: {method} {pattern}")]
    DuplicateRoute { pattern: String, method: String },

    #[error("Invalid route pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Request was already handled")]
    InvalidRequest,

    #[error("Worker pool is closed")]
    PoolClosed,

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Static files error: {0}")]
    StaticFiles(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Config(#[from] kiln_config::ConfigError),

    #[error(transparent)]
    Cache(#[from] kiln_cache::CacheError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] kiln_metrics::prometheus::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a generation failure
    pub fn generation(message: impl Into<String>) -> Self {
        Error::Generation(message.into())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
