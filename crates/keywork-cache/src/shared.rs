//! Internally synchronized cache handle.

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{CacheConfig, CostFn, KeyValidator, StatsReporter};
use crate::error::{CacheError, Result};
use crate::stats::CacheStats;
use crate::store::{BoundedCache, EntryOptions, Lookup};

/// A clonable, internally locked [`BoundedCache`] handle.
///
/// Every clone refers to the same store; operations serialize on an internal
/// mutex held only for the store mutation itself. Key validation, cost
/// computation, event listeners and the stats reporter all run outside the
/// critical section, so user-supplied functions can never block other cache
/// users or re-enter the lock.
///
/// This is the serialized rendition of the cache; use [`BoundedCache`]
/// directly when the caller already owns synchronization.
pub struct SharedCache<K, V> {
    inner: Arc<Shared<K, V>>,
}

struct Shared<K, V> {
    cache: Mutex<BoundedCache<K, V>>,
    validator: Option<KeyValidator<K>>,
    cost_fn: Option<CostFn<V>>,
    reporter: Option<StatsReporter>,
    memory_limit: u64,
}

impl<K, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    /// Creates a shared cache from a configuration.
    pub fn new(config: CacheConfig<K, V>) -> Self {
        let validator = config.key_validator.clone();
        let cost_fn = config.cost_fn.clone();
        let reporter = config.stats_reporter.clone();
        let memory_limit = config.memory_limit;
        Self {
            inner: Arc::new(Shared {
                cache: Mutex::new(BoundedCache::new(config)),
                validator,
                cost_fn,
                reporter,
                memory_limit,
            }),
        }
    }

    /// Creates a shared cache bounded only by entry count.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(CacheConfig::builder().capacity(capacity).build())
    }

    /// Stores `value` under `key` with default options.
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.set_with(key, value, EntryOptions::default())
    }

    /// Stores `value` under `key`. See [`BoundedCache::set_with`].
    pub fn set_with(&self, key: K, value: V, options: EntryOptions) -> Result<()> {
        self.write(key, Some(value), options)
    }

    /// Stores a known-absent marker under `key` with default options.
    pub fn set_absent(&self, key: K) -> Result<()> {
        self.write(key, None, EntryOptions::default())
    }

    /// Stores a known-absent marker under `key`.
    pub fn set_absent_with(&self, key: K, options: EntryOptions) -> Result<()> {
        self.write(key, None, options)
    }

    fn write(&self, key: K, value: Option<V>, options: EntryOptions) -> Result<()> {
        if !self.key_ok(&key) {
            let events = {
                let mut cache = self.inner.cache.lock();
                cache.note_invalid_key();
                cache.take_events()
            };
            self.emit(events);
            return Err(CacheError::InvalidKey);
        }
        let cost = self.cost_of(value.as_ref());
        let (outcome, events) = {
            let mut cache = self.inner.cache.lock();
            let outcome = cache.write_prevalidated(key, value, cost, options);
            (outcome, cache.take_events())
        };
        self.emit(events);
        outcome
    }

    /// Looks up `key`. See [`BoundedCache::get`].
    pub fn get(&self, key: &K) -> Lookup<V> {
        let valid = self.key_ok(key);
        let (lookup, snapshot, events) = {
            let mut cache = self.inner.cache.lock();
            let (lookup, snapshot) = cache.get_prevalidated(key, valid);
            (lookup, snapshot, cache.take_events())
        };
        self.emit(events);
        if let Some(reporter) = &self.inner.reporter {
            reporter(snapshot, lookup.kind());
        }
        lookup
    }

    /// Removes the entry for `key`, returning a present, unexpired value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.cache.lock().remove(key)
    }

    /// Removes every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let (purged, events) = {
            let mut cache = self.inner.cache.lock();
            let purged = cache.purge_expired_quiet();
            (purged, cache.take_events())
        };
        self.emit(events);
        purged
    }

    /// Removes every entry. See [`BoundedCache::clear`].
    pub fn clear(&self) {
        self.inner.cache.lock().clear();
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.inner.cache.lock().len()
    }

    /// True when nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.inner.cache.lock().is_empty()
    }

    /// Summed cost of resident values.
    pub fn cost(&self) -> u64 {
        self.inner.cache.lock().cost()
    }

    /// True when `key` is resident and not expired.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.cache.lock().contains(key)
    }

    /// How long ago the live entry for `key` was written.
    pub fn age(&self, key: &K) -> Option<std::time::Duration> {
        self.inner.cache.lock().age(key)
    }

    /// Snapshot of the lookup statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.cache.lock().stats()
    }

    /// Zeroes the statistics and starts a new boundary id.
    pub fn reset_stats(&self) {
        self.inner.cache.lock().reset_stats()
    }

    /// Trace id marking the start of the current statistics window.
    pub fn stats_boundary(&self) -> u64 {
        self.inner.cache.lock().stats_boundary()
    }

    fn key_ok(&self, key: &K) -> bool {
        self.inner.validator.as_ref().map_or(true, |v| v(key))
    }

    fn cost_of(&self, value: Option<&V>) -> u64 {
        if self.inner.memory_limit == 0 {
            return 0;
        }
        match (value, self.inner.cost_fn.as_ref()) {
            (Some(v), Some(cost_fn)) => cost_fn(v),
            _ => 0,
        }
    }

    fn emit(&self, events: Vec<crate::events::CacheEvent>) {
        if events.is_empty() {
            return;
        }
        let cache = self.inner.cache.lock();
        // Listener dispatch reads only the immutable config; clone it out so
        // the lock drops before any user callback runs.
        let config = cache.config().clone();
        drop(cache);
        crate::events::dispatch(&config.name, &config.event_listeners, &events);
    }
}
