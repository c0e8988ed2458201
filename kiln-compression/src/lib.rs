//! Response body encoding for Kiln
//!
//! This crate provides the per-worker gzip writer used by the request
//! pipeline, plus the `Content-MD5` checksum helper.
//!
//! The gzip container is assembled by hand around a raw deflate stream so
//! that a single [`ReusableGzip`] can live inside a worker for its whole
//! lifetime. Each request calls `reset()`, writes the body, and calls
//! `finish()`; no compressor state survives the reset.
//!
//! # Example
//!
//! ```rust
//! use kiln_compression::ReusableGzip;
//!
//! let mut gzip = ReusableGzip::new();
//! let first = gzip.compress(b"hello world").unwrap();
//! let second = gzip.compress(b"another body").unwrap();
//! assert_eq!(&first[..2], &[0x1f, 0x8b]);
//! assert_eq!(&second[..2], &[0x1f, 0x8b]);
//! ```

mod checksum;
mod error;
pub mod gzip;

pub use checksum::content_md5;
pub use error::CompressionError;
pub use gzip::{GZIP_HEADER, ReusableGzip};

/// Result type for compression operations
pub type Result<T> = std::result::Result<T, CompressionError>;

/// Returns true when an `Accept-Encoding` header value lists gzip.
///
/// Quality values are ignored except for an explicit `q=0`, which opts out.
pub fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding.split(',').any(|token| {
        let mut parts = token.split(';');
        let name = parts.next().unwrap_or("").trim();
        if !name.eq_ignore_ascii_case("gzip") {
            return false;
        }
        !parts.any(|param| {
            let param = param.trim();
            param == "q=0" || param == "q=0.0" || param == "q=0.000"
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_gzip() {
        assert!(accepts_gzip("gzip"));
        assert!(accepts_gzip("deflate, gzip;q=0.8"));
        assert!(accepts_gzip("GZIP"));
        assert!(!accepts_gzip("br, deflate"));
        assert!(!accepts_gzip("gzip;q=0"));
        assert!(!accepts_gzip(""));
    }
}
