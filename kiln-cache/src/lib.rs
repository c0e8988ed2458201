//! In-process caching for Kiln
//!
//! Three independently bounded caches back the request pipeline:
//!
//! - **responses**: fully rendered handler output, keyed by handler identity
//! - **files**: decoded text file contents, keyed by filesystem path
//! - **fragments**: template fragments, keyed by an opaque id
//!
//! Each cache enforces a time-to-live measured from the last write and a
//! maximum entry count (least recently used entries are evicted first).
//! Caches never call back into application code; a miss is always
//! regenerated by the caller.
//!
//! # Example
//!
//! ```
//! use kiln_cache::{CacheConfig, TtlCache};
//! use std::time::Duration;
//!
//! let cache: TtlCache<String, String> =
//!     TtlCache::new("example", CacheConfig::new(Duration::from_secs(60), 100)).unwrap();
//!
//! cache.insert("key".to_string(), "value".to_string());
//! assert_eq!(cache.get("key"), Some("value".to_string()));
//! ```

mod error;
mod manager;
mod ttl;

pub use error::{CacheError, CacheResult};
pub use manager::{CacheManager, CacheManagerConfig, CachedBody, CachedResponse};
pub use ttl::{CacheConfig, CacheStats, TtlCache};
