//! LruCache - byte 上限付き LRU map
//!
//! エントリは slab（`Vec<Option<Entry>>`）に置き、index でつないだ双方向リストで
//! 新しさを管理する。`map` は key から slot を引く。`get` / `put` は期待 O(1)
//! （追い出した分の slot 操作を除く）。
//!
//! 不変条件: `resident_bytes` はエントリサイズの合計で、`max_bytes` を超えない。

use std::collections::HashMap;
use std::hash::Hash;

use super::{ByteSize, CacheError};

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    size: usize,
    /// Towards the most recently used end.
    prev: Option<usize>,
    /// Towards the least recently used end.
    next: Option<usize>,
}

/// Not synchronized; `CacheManager` wraps it in a mutex.
#[derive(Debug)]
pub struct LruCache<K, V> {
    map: HashMap<K, usize>,
    slab: Vec<Option<Entry<K, V>>>,
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
    resident_bytes: usize,
    max_bytes: usize,
    max_entry_bytes: Option<usize>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: ByteSize,
{
    pub fn new(max_bytes: usize, max_entry_bytes: Option<usize>) -> Self {
        Self {
            map: HashMap::new(),
            slab: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            resident_bytes: 0,
            max_bytes,
            max_entry_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Look up `key` and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.detach(idx);
        self.push_front(idx);
        self.entry(idx).map(|e| &e.value)
    }

    /// Look up without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.entry(idx).map(|e| &e.value)
    }

    /// Insert or overwrite `key`, evicting least recently used entries until
    /// the value fits. Returns the evicted keys, oldest first.
    ///
    /// A value larger than the per-entry cap or the whole capacity is rejected
    /// and the cache (including any previous value for `key`) is left as is.
    pub fn put(&mut self, key: K, value: V) -> Result<Vec<K>, CacheError> {
        let size = value.byte_size();
        let limit = self
            .max_entry_bytes
            .map_or(self.max_bytes, |cap| cap.min(self.max_bytes));
        if size > limit {
            return Err(CacheError::Capacity { size, limit });
        }

        if let Some(old) = self.map.get(&key).copied() {
            self.remove_slot(old);
        }

        let mut evicted = Vec::new();
        while self.resident_bytes + size > self.max_bytes {
            match self.pop_back() {
                Some(key) => evicted.push(key),
                None => break,
            }
        }

        let entry = Entry {
            key: key.clone(),
            value,
            size,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                if let Some(slot) = self.slab.get_mut(idx) {
                    *slot = Some(entry);
                }
                idx
            }
            None => {
                self.slab.push(Some(entry));
                self.slab.len() - 1
            }
        };
        self.map.insert(key, idx);
        self.push_front(idx);
        self.resident_bytes += size;
        Ok(evicted)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.get(key).copied()?;
        self.remove_slot(idx).map(|e| e.value)
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.slab.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.resident_bytes = 0;
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(entry) = self.entry(idx) else {
                break;
            };
            keys.push(entry.key.clone());
            cursor = entry.next;
        }
        keys
    }

    fn entry(&self, idx: usize) -> Option<&Entry<K, V>> {
        self.slab.get(idx).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, idx: usize) -> Option<&mut Entry<K, V>> {
        self.slab.get_mut(idx).and_then(Option::as_mut)
    }

    fn pop_back(&mut self) -> Option<K> {
        let idx = self.tail?;
        self.remove_slot(idx).map(|e| e.key)
    }

    fn remove_slot(&mut self, idx: usize) -> Option<Entry<K, V>> {
        self.detach(idx);
        let entry = self.slab.get_mut(idx).and_then(Option::take)?;
        self.map.remove(&entry.key);
        self.free.push(idx);
        self.resident_bytes -= entry.size;
        Some(entry)
    }

    /// Unlink `idx` from the recency list, keeping the slot.
    fn detach(&mut self, idx: usize) {
        let Some((prev, next)) = self.entry(idx).map(|e| (e.prev, e.next)) else {
            return;
        };
        match prev {
            Some(p) => {
                if let Some(e) = self.entry_mut(p) {
                    e.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(e) = self.entry_mut(n) {
                    e.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(e) = self.entry_mut(idx) {
            e.prev = None;
            e.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(e) = self.entry_mut(idx) {
            e.prev = None;
            e.next = old_head;
        }
        if let Some(h) = old_head
            && let Some(e) = self.entry_mut(h)
        {
            e.prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(n: usize) -> Vec<u8> {
        vec![0; n]
    }

    #[test]
    fn third_entry_evicts_least_recently_used() {
        let mut cache = LruCache::new(100, None);
        cache.put("A", bytes(40)).unwrap();
        cache.put("B", bytes(40)).unwrap();
        let evicted = cache.put("C", bytes(40)).unwrap();

        assert_eq!(evicted, vec!["A"]);
        assert!(!cache.contains(&"A"));
        assert!(cache.contains(&"B"));
        assert!(cache.contains(&"C"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.resident_bytes(), 80);
    }

    #[test]
    fn access_changes_the_eviction_victim() {
        let mut cache = LruCache::new(100, None);
        cache.put("A", bytes(40)).unwrap();
        cache.put("B", bytes(40)).unwrap();
        assert!(cache.get(&"A").is_some());

        // A was touched, so B is now the least recently used
        let evicted = cache.put("C", bytes(40)).unwrap();
        assert_eq!(evicted, vec!["B"]);
        assert_eq!(cache.keys_by_recency(), vec!["C", "A"]);
    }

    #[test]
    fn touching_the_newest_entry_keeps_the_oldest_as_victim() {
        let mut cache = LruCache::new(100, None);
        cache.put("A", bytes(40)).unwrap();
        cache.put("B", bytes(40)).unwrap();
        assert!(cache.get(&"B").is_some());

        assert_eq!(cache.put("C", bytes(40)).unwrap(), vec!["A"]);
        assert_eq!(cache.keys_by_recency(), vec!["C", "B"]);
    }

    #[test]
    fn eviction_continues_until_the_entry_fits() {
        let mut cache = LruCache::new(100, None);
        cache.put("A", bytes(30)).unwrap();
        cache.put("B", bytes(30)).unwrap();
        cache.put("C", bytes(30)).unwrap();

        let evicted = cache.put("D", bytes(70)).unwrap();
        assert_eq!(evicted, vec!["A", "B"]);
        assert_eq!(cache.resident_bytes(), 100);
    }

    #[test]
    fn oversized_entry_is_rejected_without_side_effects() {
        let mut cache = LruCache::new(100, None);
        cache.put("A", bytes(40)).unwrap();

        let err = cache.put("A", bytes(101)).unwrap_err();
        assert_eq!(err, CacheError::Capacity { size: 101, limit: 100 });
        assert_eq!(cache.peek(&"A").map(Vec::len), Some(40));
        assert_eq!(cache.resident_bytes(), 40);
    }

    #[test]
    fn per_entry_cap_is_enforced() {
        let mut cache = LruCache::new(100, Some(50));
        assert!(cache.put("A", bytes(50)).is_ok());
        assert_eq!(
            cache.put("B", bytes(51)),
            Err(CacheError::Capacity { size: 51, limit: 50 })
        );
    }

    #[test]
    fn overwrite_releases_previous_bytes() {
        let mut cache = LruCache::new(100, None);
        cache.put("A", bytes(60)).unwrap();
        cache.put("B", bytes(30)).unwrap();

        // 60 -> 20 for A: nothing has to go
        let evicted = cache.put("A", bytes(20)).unwrap();
        assert!(evicted.is_empty());
        assert_eq!(cache.resident_bytes(), 50);
        assert_eq!(cache.keys_by_recency(), vec!["A", "B"]);
    }

    #[test]
    fn remove_and_slot_reuse() {
        let mut cache = LruCache::new(100, None);
        cache.put(1, bytes(10)).unwrap();
        cache.put(2, bytes(10)).unwrap();
        assert_eq!(cache.remove(&1).map(|v| v.len()), Some(10));
        assert_eq!(cache.remove(&1), None);

        cache.put(3, bytes(10)).unwrap();
        assert_eq!(cache.keys_by_recency(), vec![3, 2]);
        assert_eq!(cache.resident_bytes(), 20);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.resident_bytes(), 0);
    }
}
