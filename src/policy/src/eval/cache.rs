//! Bounded LRU cache of expression vectors
//!
//! Two key namespaces share one cache:
//! - common vectors, keyed by `(schema version, user, environment)`
//! - subject vectors, keyed by `(schema version, common key, subject, instance)`
//!
//! Keys are BLAKE3 digests rendered as hex strings. JSON inputs are hashed
//! with object keys sorted, so key order in the input never changes a key.

use blake3::Hasher;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

use super::vector::LazyVector;
use crate::config::CacheConfig;
use crate::error::{PolicyError, Result};

/// Cached expression vector
pub type CacheEntry = Arc<LazyVector>;

/// Thread-safe LRU cache of lazily filled expression vectors
pub struct EvaluationCache {
    entries: Mutex<LruCache<String, CacheEntry>>,

    config: CacheConfig,

    /// Hit/miss/eviction counters
    stats: DashMap<&'static str, u64>,
}

impl EvaluationCache {
    /// Create an empty cache
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config.capacity` is zero.
    pub fn new(config: CacheConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.capacity).ok_or_else(|| {
            PolicyError::Configuration("Cache capacity must be at least 1".to_string())
        })?;

        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            config,
            stats: DashMap::new(),
        })
    }

    /// Look up `key`, refreshing its recency on a hit
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.lock().get(key).cloned();
        if entry.is_some() {
            self.increment_stat("hits");
        } else {
            self.increment_stat("misses");
        }
        entry
    }

    /// Insert `entry`, evicting the least recently used key when full
    pub fn set(&self, key: impl Into<String>, entry: CacheEntry) {
        let key = key.into();
        let evicted = self.entries.lock().push(key.clone(), entry);
        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                debug!("Evicted cache entry {}", evicted_key);
                self.increment_stat("evictions");
            }
        }
    }

    /// `true` if `key` is cached; does not touch recency
    pub fn has(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }

    /// Cached entry for `key`, or the result of `create` stored under it
    ///
    /// `create` runs outside the lock. Two callers missing on the same key
    /// may both create an entry; the last one stored wins.
    pub fn get_or_insert_with(&self, key: &str, create: impl FnOnce() -> CacheEntry) -> CacheEntry {
        if let Some(entry) = self.get(key) {
            debug!("Cache hit for {}", key);
            return entry;
        }

        debug!("Cache miss for {}", key);
        let entry = create();
        self.set(key, Arc::clone(&entry));
        entry
    }

    /// Remove every entry and reset the counters
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.stats.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            evictions: self.get_stat("evictions"),
            entries: self.len(),
            capacity: self.config.capacity,
        }
    }

    fn increment_stat(&self, name: &'static str) {
        *self.stats.entry(name).or_insert(0) += 1;
    }

    fn get_stat(&self, name: &'static str) -> u64 {
        self.stats.get(name).map(|v| *v).unwrap_or(0)
    }
}

/// Key of the common vector for one `(user, environment)` pair
pub fn common_key(schema_version: &str, user: &Value, environment: &Value) -> String {
    let mut hasher = Hasher::new();
    hasher.update(b"common\0");
    update_str(&mut hasher, schema_version);
    hash_value(&mut hasher, user);
    hash_value(&mut hasher, environment);
    hasher.finalize().to_hex().to_string()
}

/// Key of the subject vector for `instance` on top of the common vector
/// stored under `common_key`
pub fn subject_key(schema_version: &str, common_key: &str, subject: &str, instance: &Value) -> String {
    let mut hasher = Hasher::new();
    hasher.update(b"subject\0");
    update_str(&mut hasher, schema_version);
    update_str(&mut hasher, common_key);
    update_str(&mut hasher, subject);
    hash_value(&mut hasher, instance);
    hasher.finalize().to_hex().to_string()
}

fn update_str(hasher: &mut Hasher, text: &str) {
    hasher.update(&(text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}

/// Feed `value` into `hasher` with object keys in sorted order, independent of
/// the map's iteration order
fn hash_value(hasher: &mut Hasher, value: &Value) {
    match value {
        Value::Null => {
            hasher.update(b"n");
        }
        Value::Bool(b) => {
            hasher.update(if *b { b"t" } else { b"f" });
        }
        Value::Number(n) => {
            hasher.update(b"#");
            update_str(hasher, &n.to_string());
        }
        Value::String(text) => {
            hasher.update(b"s");
            update_str(hasher, text);
        }
        Value::Array(items) => {
            hasher.update(b"[");
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                hash_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update(b"{");
            hasher.update(&(map.len() as u64).to_le_bytes());
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, item) in entries {
                update_str(hasher, key);
                hash_value(hasher, item);
            }
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
