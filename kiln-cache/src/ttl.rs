//! TTL + LRU bounded cache.

use crate::{CacheError, CacheResult};
use lru::LruCache;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Bounds for a single cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Time-to-live measured from the last write
    pub ttl: Duration,
    /// Maximum number of live entries
    pub max_entries: usize,
}

impl CacheConfig {
    /// Create a new cache configuration.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries }
    }

    /// Set the time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the maximum entry count.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 1000,
        }
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that returned a live entry
    pub hits: u64,
    /// Reads that found nothing or an expired entry
    pub misses: u64,
    /// Successful writes
    pub insertions: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
    /// Entries dropped to respect `max_entries`
    pub evictions: u64,
    /// Entries currently held (live or not yet noticed as expired)
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of reads that were hits.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    written: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

/// A thread-safe cache bounded by age and entry count.
///
/// Values are cloned out on read, so large payloads should be stored behind
/// an `Arc` or as `Bytes`.
#[derive(Debug)]
pub struct TtlCache<K: Hash + Eq, V> {
    name: String,
    ttl: Duration,
    entries: Mutex<LruCache<K, Entry<V>>>,
    counters: Counters,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// Create a named cache. Zero capacity is rejected.
    pub fn new(name: impl Into<String>, config: CacheConfig) -> CacheResult<Self> {
        let name = name.into();
        let capacity = NonZeroUsize::new(config.max_entries)
            .ok_or_else(|| CacheError::ZeroCapacity(name.clone()))?;

        Ok(Self::with_capacity(name, config.ttl, capacity))
    }

    pub(crate) fn with_capacity(name: impl Into<String>, ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            name: name.into(),
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
            counters: Counters::default(),
        }
    }

    /// Cache name used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    /// Read a live entry, dropping it if its TTL has elapsed.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if entry.written.elapsed() < self.ttl => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            trace!(cache = %self.name, "entry expired");
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Write an entry, resetting its age.
    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        let replacing = entries.contains(&key);

        let displaced = entries.push(
            key,
            Entry {
                value,
                written: Instant::now(),
            },
        );

        if displaced.is_some() && !replacing {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(cache = %self.name, "evicted least recently used entry");
        }
        self.counters.insertions.fetch_add(1, Ordering::Relaxed);
    }

    /// Read an entry or compute and store it.
    pub fn get_or_insert_with<F, E>(&self, key: K, make: F) -> Result<V, E>
    where
        K: Clone,
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = make()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Whether a live entry exists. Does not touch recency or counters.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .lock()
            .peek(key)
            .is_some_and(|entry| entry.written.elapsed() < self.ttl)
    }

    /// Remove an entry.
    pub fn invalidate<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().pop(key).is_some()
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        if !entries
            .iter()
            .any(|(_, entry)| entry.written.elapsed() >= self.ttl)
        {
            return 0;
        }

        // LruCache has no retain; rebuild from the survivors, oldest first
        let capacity = entries.cap();
        let mut kept = LruCache::new(capacity);
        let mut drained = Vec::with_capacity(entries.len());
        while let Some((key, entry)) = entries.pop_lru() {
            drained.push((key, entry));
        }
        let mut removed = 0;
        for (key, entry) in drained {
            if entry.written.elapsed() < self.ttl {
                kept.push(key, entry);
            } else {
                removed += 1;
            }
        }
        *entries = kept;

        self.counters
            .expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Snapshot the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            insertions: self.counters.insertions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl: Duration, max: usize) -> TtlCache<String, u32> {
        TtlCache::new("test", CacheConfig::new(ttl, max)).unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result: CacheResult<TtlCache<String, u32>> =
            TtlCache::new("empty", CacheConfig::new(Duration::from_secs(1), 0));
        assert!(matches!(result, Err(CacheError::ZeroCapacity(name)) if name == "empty"));
    }

    #[test]
    fn test_round_trip() {
        let cache = cache(Duration::from_secs(60), 10);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_zero_ttl_always_misses() {
        let cache = cache(Duration::ZERO, 10);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get("a"), None);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.entries, 0);
    }

    #[test]
    fn test_lru_eviction_respects_capacity() {
        let cache = cache(Duration::from_secs(60), 2);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        // touch "a" so "b" becomes least recently used
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_replace_is_not_eviction() {
        let cache = cache(Duration::from_secs(60), 1);
        cache.insert("a".to_string(), 1);
        cache.insert("a".to_string(), 2);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_get_or_insert_with_runs_once() {
        let cache = cache(Duration::from_secs(60), 4);
        let mut calls = 0;
        for _ in 0..3 {
            let value: Result<u32, ()> = cache.get_or_insert_with("k".to_string(), || {
                calls += 1;
                Ok(9)
            });
            assert_eq!(value, Ok(9));
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_purge_expired() {
        let cache = cache(Duration::ZERO, 4);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let cache = cache(Duration::from_secs(60), 4);
        cache.insert("a".to_string(), 1);
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert!(!cache.contains("a"));
    }
}
