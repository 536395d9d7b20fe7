//! Embedding cache.
//!
//! Embedding vectors are stable for a given model and request shape, so
//! repeated texts across runs (and across pages) are served from memory.
//! Entries are keyed by a SHA-256 of the text plus the task type and output
//! dimensionality, bounded in size, and expire after a TTL.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::traits::embedder::{EmbedOptions, EmbeddingTask};
use crate::types::config::{CacheConfig, EvictionPolicy};

/// Cache key: text digest plus request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmbeddingKey {
    digest: [u8; 32],
    task: EmbeddingTask,
    dimensions: Option<usize>,
}

impl EmbeddingKey {
    pub fn new(text: &str, options: &EmbedOptions) -> Self {
        Self {
            digest: Sha256::digest(text.as_bytes()).into(),
            task: options.task_type,
            dimensions: options.dimensions,
        }
    }
}

struct Entry {
    vector: Arc<[f32]>,
    inserted: Instant,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate in `[0, 1]`; 0 when nothing was requested.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Size- and TTL-bounded embedding cache with pluggable eviction.
///
/// Instances are independent; construct one per component (or share one
/// through an `Arc`) rather than relying on global state.
pub struct EmbeddingCache {
    config: CacheConfig,
    entries: Mutex<IndexMap<EmbeddingKey, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl EmbeddingCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(IndexMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn ttl(&self) -> Option<Duration> {
        (self.config.ttl_ms > 0).then(|| Duration::from_millis(self.config.ttl_ms))
    }

    /// Cached vector for `key`, if present and not expired.
    pub fn get(&self, key: &EmbeddingKey) -> Option<Arc<[f32]>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(idx) = entries.get_index_of(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let expired = self
            .ttl()
            .is_some_and(|ttl| entries[idx].inserted.elapsed() >= ttl);
        if expired {
            entries.shift_remove_index(idx);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let idx = match self.config.eviction {
            EvictionPolicy::Lru => {
                let last = entries.len() - 1;
                entries.move_index(idx, last);
                last
            }
            EvictionPolicy::Fifo => idx,
        };

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(Arc::clone(&entries[idx].vector))
    }

    /// Store a vector, evicting per policy when full.
    pub fn insert(&self, key: EmbeddingKey, vector: Vec<f32>) {
        if self.config.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.shift_remove(&key);
        while entries.len() >= self.config.max_entries {
            entries.shift_remove_index(0);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        entries.insert(
            key,
            Entry {
                vector: vector.into(),
                inserted: Instant::now(),
            },
        );
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> EmbeddingKey {
        EmbeddingKey::new(text, &EmbedOptions::default())
    }

    #[test]
    fn test_get_and_insert() {
        let cache = EmbeddingCache::default();
        assert!(cache.get(&key("a")).is_none());

        cache.insert(key("a"), vec![1.0, 2.0]);
        assert_eq!(cache.get(&key("a")).as_deref(), Some(&[1.0, 2.0][..]));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_key_includes_request_shape() {
        let cache = EmbeddingCache::default();
        cache.insert(key("a"), vec![1.0]);

        let truncated = EmbedOptions {
            dimensions: Some(256),
            ..Default::default()
        };
        assert!(cache.get(&EmbeddingKey::new("a", &truncated)).is_none());

        let clustering = EmbedOptions {
            task_type: EmbeddingTask::Clustering,
            ..Default::default()
        };
        assert!(cache.get(&EmbeddingKey::new("a", &clustering)).is_none());
    }

    #[test]
    fn test_fifo_eviction() {
        let cache = EmbeddingCache::new(CacheConfig::default().with_max_entries(2));
        cache.insert(key("a"), vec![1.0]);
        cache.insert(key("b"), vec![2.0]);
        cache.get(&key("a"));
        cache.insert(key("c"), vec![3.0]);

        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("b")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = EmbeddingCache::new(
            CacheConfig::default()
                .with_max_entries(2)
                .with_eviction(EvictionPolicy::Lru),
        );
        cache.insert(key("a"), vec![1.0]);
        cache.insert(key("b"), vec![2.0]);
        cache.get(&key("a"));
        cache.insert(key("c"), vec![3.0]);

        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = EmbeddingCache::new(CacheConfig::default().with_ttl_ms(1));
        cache.insert(key("a"), vec![1.0]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = EmbeddingCache::new(CacheConfig::default().with_max_entries(0));
        cache.insert(key("a"), vec![1.0]);
        assert!(cache.is_empty());
    }
}
