// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded LRU embedding cache with independent TTL expiry.
//!
//! Keyed by a SHA-256 digest of (model, whitespace-normalized text).
//! Purely a performance layer: it owns no durable state and can be
//! dropped and rebuilt without correctness loss. A hit returns exactly the
//! vector that was inserted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::debug;

/// Cache tuning, injected at construction.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entry-count ceiling; least-recently-used entries are evicted beyond it.
    pub capacity: usize,
    /// Time-to-live independent of LRU position.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1_024,
            ttl: Duration::from_secs(3_600),
        }
    }
}

struct Entry {
    vector: Vec<f32>,
    inserted_at: Instant,
    last_used: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Monotonic access tick; higher means more recently used.
    tick: u64,
}

/// Thread-safe LRU+TTL cache in front of the embedding gateway.
///
/// One mutex guards the map so read-modify-write of the LRU ordering is
/// atomic under concurrent access.
pub struct EmbeddingCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
}

/// Cache key: SHA-256 over the model name and whitespace-normalized text.
pub fn cache_key(model: &str, text: &str) -> String {
    let normalized: Vec<&str> = text.split_whitespace().collect();
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized.join(" ").as_bytes());
    hex::encode(hasher.finalize())
}

impl EmbeddingCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
            }),
        }
    }

    /// Look up a cached embedding. An expired entry is a miss and is
    /// removed on the spot.
    pub fn get(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        let key = cache_key(model, text);
        let mut inner = self.lock();

        let expired = match inner.entries.get(&key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.config.ttl,
            None => {
                metrics::counter!("engram_cache_misses_total").increment(1);
                return None;
            }
        };
        if expired {
            inner.entries.remove(&key);
            debug!(key = %key, "cache entry expired");
            metrics::counter!("engram_cache_expiries_total").increment(1);
            metrics::counter!("engram_cache_misses_total").increment(1);
            return None;
        }

        inner.tick += 1;
        let tick = inner.tick;
        match inner.entries.get_mut(&key) {
            Some(entry) => {
                entry.last_used = tick;
                metrics::counter!("engram_cache_hits_total").increment(1);
                Some(entry.vector.clone())
            }
            None => {
                metrics::counter!("engram_cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Insert an embedding, evicting least-recently-used entries past the
    /// capacity ceiling.
    pub fn put(&self, model: &str, text: &str, vector: Vec<f32>) {
        let key = cache_key(model, text);
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            key,
            Entry {
                vector,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );

        while inner.entries.len() > self.config.capacity {
            let lru_key = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match lru_key {
                Some(lru_key) => {
                    inner.entries.remove(&lru_key);
                    debug!(key = %lru_key, "cache entry evicted");
                    metrics::counter!("engram_cache_evictions_total").increment(1);
                }
                None => break,
            }
        }
    }

    /// Current entry count.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries (shutdown lifecycle).
    pub fn drain(&self) {
        self.lock().entries.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
