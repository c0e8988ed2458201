//! The three cache categories used by the request pipeline.

use crate::{CacheConfig, CacheResult, CacheStats, TtlCache};
use bytes::Bytes;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Body stored in the response cache. Text and bytes stay distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedBody {
    Text(Arc<str>),
    Bytes(Bytes),
}

impl CachedBody {
    pub fn len(&self) -> usize {
        match self {
            CachedBody::Text(text) => text.len(),
            CachedBody::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A rendered handler response.
///
/// `headers` holds what the generator and decorators set, in order.
/// Cookies are never part of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: CachedBody,
}

impl CachedResponse {
    /// First value for `name`, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Bounds for each category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheManagerConfig {
    pub responses: CacheConfig,
    pub files: CacheConfig,
    pub fragments: CacheConfig,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            responses: CacheConfig::new(Duration::from_secs(3600), 1000),
            files: CacheConfig::new(Duration::from_secs(86_400), 1000),
            fragments: CacheConfig::new(Duration::from_secs(3600), 1000),
        }
    }
}

/// Owner of the response, file and fragment caches.
///
/// When disabled, every read misses and every write is discarded.
#[derive(Debug)]
pub struct CacheManager {
    enabled: bool,
    responses: TtlCache<String, CachedResponse>,
    files: TtlCache<PathBuf, Arc<str>>,
    fragments: TtlCache<String, Arc<str>>,
}

impl CacheManager {
    /// Build the three caches from their bounds.
    pub fn new(config: CacheManagerConfig) -> CacheResult<Self> {
        debug!(
            responses = config.responses.max_entries,
            files = config.files.max_entries,
            fragments = config.fragments.max_entries,
            "cache manager configured"
        );
        Ok(Self {
            enabled: true,
            responses: TtlCache::new("responses", config.responses)?,
            files: TtlCache::new("files", config.files)?,
            fragments: TtlCache::new("fragments", config.fragments)?,
        })
    }

    /// A manager that never stores anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            responses: TtlCache::with_capacity("responses", Duration::ZERO, NonZeroUsize::MIN),
            files: TtlCache::with_capacity("files", Duration::ZERO, NonZeroUsize::MIN),
            fragments: TtlCache::with_capacity("fragments", Duration::ZERO, NonZeroUsize::MIN),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // ========================================================================
    // Handler responses
    // ========================================================================

    pub fn response(&self, handler: &str) -> Option<CachedResponse> {
        if !self.enabled {
            return None;
        }
        self.responses.get(handler)
    }

    pub fn store_response(&self, handler: impl Into<String>, response: CachedResponse) {
        if self.enabled {
            self.responses.insert(handler.into(), response);
        }
    }

    // ========================================================================
    // File contents
    // ========================================================================

    pub fn file(&self, path: &std::path::Path) -> Option<Arc<str>> {
        if !self.enabled {
            return None;
        }
        self.files.get(path)
    }

    pub fn store_file(&self, path: impl Into<PathBuf>, contents: Arc<str>) {
        if self.enabled {
            self.files.insert(path.into(), contents);
        }
    }

    // ========================================================================
    // Template fragments
    // ========================================================================

    pub fn fragment(&self, id: &str) -> Option<Arc<str>> {
        if !self.enabled {
            return None;
        }
        self.fragments.get(id)
    }

    pub fn store_fragment(&self, id: impl Into<String>, fragment: Arc<str>) {
        if self.enabled {
            self.fragments.insert(id.into(), fragment);
        }
    }

    /// Drop everything in every category.
    pub fn clear(&self) {
        self.responses.clear();
        self.files.clear();
        self.fragments.clear();
    }

    /// Drop expired entries in every category.
    pub fn purge_expired(&self) -> usize {
        self.responses.purge_expired() + self.files.purge_expired() + self.fragments.purge_expired()
    }

    /// Per-category counters, in `(name, stats)` pairs.
    pub fn stats(&self) -> [(&'static str, CacheStats); 3] {
        [
            ("responses", self.responses.stats()),
            ("files", self.files.stats()),
            ("fragments", self.fragments.stats()),
        ]
    }

    pub fn responses(&self) -> &TtlCache<String, CachedResponse> {
        &self.responses
    }

    pub fn files(&self) -> &TtlCache<PathBuf, Arc<str>> {
        &self.files
    }

    pub fn fragments(&self) -> &TtlCache<String, Arc<str>> {
        &self.fragments
    }
}
