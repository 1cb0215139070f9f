//! CacheManager - namespace ごとのスレッドセーフな共有キャッシュ

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ByteSize, CacheError, LruCache};
use crate::config::CacheConfig;

/// Counters exposed for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub rejections: u64,
    pub entries: usize,
    pub resident_bytes: usize,
    pub max_bytes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    rejections: AtomicU64,
}

/// A byte-bounded LRU cache shared between callers.
///
/// Constructed explicitly and passed around (usually in an `Arc`); there is no
/// process-wide instance, so each test or tenant gets isolated state and
/// statistics.
///
/// The lock is held only for the map operation itself. A poisoned lock is
/// treated as a cache failure: the cache is emptied, the call degrades to a
/// miss (`get`) or `Unavailable` (`put`), and later calls work normally.
#[derive(Debug)]
pub struct CacheManager<K, V> {
    namespace: String,
    inner: Mutex<LruCache<K, V>>,
    counters: Counters,
}

impl<K, V> CacheManager<K, V>
where
    K: Eq + Hash + Clone,
    V: ByteSize + Clone,
{
    pub fn new(namespace: impl Into<String>, config: &CacheConfig) -> Self {
        Self {
            namespace: namespace.into(),
            inner: Mutex::new(LruCache::new(config.max_bytes, config.max_entry_bytes)),
            counters: Counters::default(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Return a clone of the cached value and mark it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.lock().and_then(|mut cache| cache.get(key).cloned());
        let counter = if value.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Store `value`, evicting least recently used entries as needed.
    ///
    /// `CacheError::Capacity` means the value was skipped; callers carry on
    /// without caching.
    pub fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        let Some(mut cache) = self.lock() else {
            return Err(CacheError::Unavailable {
                namespace: self.namespace.clone(),
            });
        };
        match cache.put(key, value) {
            Ok(evicted) => {
                drop(cache);
                self.counters.inserts.fetch_add(1, Ordering::Relaxed);
                if !evicted.is_empty() {
                    self.counters
                        .evictions
                        .fetch_add(evicted.len() as u64, Ordering::Relaxed);
                    debug!(namespace = %self.namespace, evicted = evicted.len(), "cache eviction");
                }
                Ok(())
            }
            Err(err) => {
                drop(cache);
                self.counters.rejections.fetch_add(1, Ordering::Relaxed);
                debug!(namespace = %self.namespace, error = %err, "cache put rejected");
                Err(err)
            }
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().and_then(|mut cache| cache.remove(key))
    }

    pub fn clear(&self) {
        if let Some(mut cache) = self.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map_or(0, |cache| cache.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resident_bytes(&self) -> usize {
        self.lock().map_or(0, |cache| cache.resident_bytes())
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, resident_bytes, max_bytes) = self
            .lock()
            .map_or((0, 0, 0), |c| (c.len(), c.resident_bytes(), c.max_bytes()));
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            rejections: self.counters.rejections.load(Ordering::Relaxed),
            entries,
            resident_bytes,
            max_bytes,
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<K, V>>> {
        match self.inner.lock() {
            Ok(guard) => Some(guard),
            Err(poisoned) => {
                warn!(namespace = %self.namespace, "cache lock poisoned; dropping cached entries");
                poisoned.into_inner().clear();
                self.inner.clear_poison();
                None
            }
        }
    }
}
