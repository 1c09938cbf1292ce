//! Priority-bucketed LRU collection.
//!
//! The backbone of [`BoundedCache`](crate::BoundedCache): entries are grouped
//! into buckets by priority, each bucket keeping strict recency order. The
//! eviction victim is always the least recently touched entry of the lowest
//! priority bucket.

use std::collections::BTreeMap;
use std::hash::Hash;

use hashbrown::HashMap;
use lru::LruCache;
use ordered_float::OrderedFloat;

/// An indexed, bounded collection of `(key, value, priority)` triples.
///
/// `put`, `get` and `remove` are amortized O(log P) where P is the number of
/// distinct priorities in use; with a single priority every operation is
/// O(1). Ties within a bucket are broken by strict access order: the entry
/// touched longest ago is evicted first.
pub struct PriorityLru<K, V> {
    buckets: BTreeMap<OrderedFloat<f64>, LruCache<K, V>>,
    index: HashMap<K, f64>,
    capacity: usize,
}

impl<K, V> PriorityLru<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates a collection holding at most `capacity` entries. A capacity of
    /// zero refuses every insert.
    pub fn new(capacity: usize) -> Self {
        Self {
            buckets: BTreeMap::new(),
            index: HashMap::new(),
            capacity,
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when at capacity.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Inserts or updates an entry, making it the most recently used of its
    /// bucket. An update may move the entry to a different bucket when the
    /// priority changed. If the insert pushes the collection over capacity
    /// the eviction victim is returned; a zero-capacity collection returns
    /// the incoming pair itself.
    pub fn put(&mut self, key: K, value: V, priority: f64) -> Option<(K, V)> {
        if self.capacity == 0 {
            return Some((key, value));
        }
        if let Some(old_priority) = self.index.get(&key).copied() {
            if old_priority != priority {
                self.detach(&key, old_priority);
                self.attach(key.clone(), value, priority);
                self.index.insert(key, priority);
            } else {
                self.buckets
                    .get_mut(&OrderedFloat(priority))
                    .expect("indexed key has a bucket")
                    .put(key, value);
            }
            return None;
        }
        self.attach(key.clone(), value, priority);
        self.index.insert(key, priority);
        if self.len() > self.capacity {
            return self.evict_one();
        }
        None
    }

    /// Returns the value for `key` and touches it to most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let priority = *self.index.get(key)?;
        self.buckets
            .get_mut(&OrderedFloat(priority))
            .expect("indexed key has a bucket")
            .get(key)
    }

    /// Returns the value for `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let priority = *self.index.get(key)?;
        self.buckets
            .get(&OrderedFloat(priority))
            .expect("indexed key has a bucket")
            .peek(key)
    }

    /// Removes the entry for `key`.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let priority = self.index.remove(key)?;
        let bucket = self
            .buckets
            .get_mut(&OrderedFloat(priority))
            .expect("indexed key has a bucket");
        let value = bucket.pop(key);
        if bucket.is_empty() {
            self.buckets.remove(&OrderedFloat(priority));
        }
        value
    }

    /// Removes and returns the least recently used entry of the lowest
    /// priority non-empty bucket.
    pub fn evict_one(&mut self) -> Option<(K, V)> {
        let mut entry = self.buckets.first_entry()?;
        let bucket = entry.get_mut();
        let (key, value) = bucket.pop_lru().expect("buckets are removed when drained");
        if bucket.is_empty() {
            entry.remove();
        }
        self.index.remove(&key);
        Some((key, value))
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.index.clear();
    }

    fn attach(&mut self, key: K, value: V, priority: f64) {
        self.buckets
            .entry(OrderedFloat(priority))
            .or_insert_with(LruCache::unbounded)
            .put(key, value);
    }

    fn detach(&mut self, key: &K, priority: f64) {
        let bucket = self
            .buckets
            .get_mut(&OrderedFloat(priority))
            .expect("indexed key has a bucket");
        bucket.pop(key);
        if bucket.is_empty() {
            self.buckets.remove(&OrderedFloat(priority));
        }
    }
}
