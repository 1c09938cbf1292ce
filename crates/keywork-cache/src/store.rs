//! Bounded cache storage.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use keywork_core::{Clock, TraceIdFactory};
use rand::RngExt;

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::events::{CacheEvent, EvictionReason};
use crate::priority_lru::PriorityLru;
use crate::stats::{CacheStats, LookupKind};

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// A present value was found and touched.
    Hit(V),
    /// A stored known-absent marker was found: the value is known to not
    /// exist, which is different from not knowing anything about it.
    HitAbsent,
    /// Nothing usable was found. Expired entries surface here.
    Miss,
    /// The key failed validation.
    InvalidKey,
}

impl<V> Lookup<V> {
    /// The outcome class, for statistics.
    pub fn kind(&self) -> LookupKind {
        match self {
            Lookup::Hit(_) => LookupKind::Hit,
            Lookup::HitAbsent => LookupKind::HitAbsent,
            Lookup::Miss => LookupKind::Miss,
            Lookup::InvalidKey => LookupKind::InvalidKey,
        }
    }

    /// True for [`Lookup::Hit`] and [`Lookup::HitAbsent`].
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_) | Lookup::HitAbsent)
    }

    /// The present value, if any.
    pub fn into_value(self) -> Option<V> {
        match self {
            Lookup::Hit(v) => Some(v),
            _ => None,
        }
    }
}

/// Per-write TTL selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ttl {
    /// Use the configured default for the value class (present or absent).
    #[default]
    Default,
    /// Expire after the given duration. `Duration::ZERO` means never store.
    After(Duration),
    /// Never expire.
    Never,
}

/// Per-write options for [`BoundedCache::set_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryOptions {
    /// Eviction priority; higher values survive longer. Default `0.0`.
    pub priority: f64,
    /// TTL override. Default: the configured default.
    pub ttl: Ttl,
}

impl EntryOptions {
    /// Options with the given priority and the default TTL.
    pub fn priority(priority: f64) -> Self {
        Self {
            priority,
            ttl: Ttl::Default,
        }
    }

    /// Options with the given TTL and the default priority.
    pub fn ttl(ttl: Ttl) -> Self {
        Self {
            priority: 0.0,
            ttl,
        }
    }
}

struct Entry<V> {
    value: Option<V>,
    cost: u64,
    inserted_at: Instant,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A thread-compatible key→value store with per-entry TTL, per-entry
/// priority and dual eviction bounds (entry count and byte cost).
///
/// Methods take `&mut self`; the caller owns synchronization. For a cache
/// serialized by an internal lock, wrap it in
/// [`SharedCache`](crate::SharedCache).
///
/// # Example
///
/// ```rust
/// use keywork_cache::{BoundedCache, CacheConfig, EntryOptions, Lookup};
///
/// let config = CacheConfig::builder()
///     .capacity(2)
///     .name("example")
///     .build();
/// let mut cache = BoundedCache::new(config);
///
/// cache.set("a", 1).unwrap();
/// cache.set_with("b", 2, EntryOptions::priority(5.0)).unwrap();
/// assert_eq!(cache.get(&"a"), Lookup::Hit(1));
///
/// // "c" displaces the low-priority "a", not the high-priority "b".
/// cache.set("c", 3).unwrap();
/// assert_eq!(cache.get(&"a"), Lookup::Miss);
/// assert_eq!(cache.get(&"b"), Lookup::Hit(2));
/// ```
pub struct BoundedCache<K, V> {
    config: CacheConfig<K, V>,
    entries: PriorityLru<K, Entry<V>>,
    expiry: BTreeMap<Instant, Vec<K>>,
    total_cost: u64,
    stats: CacheStats,
    boundary: u64,
    trace: TraceIdFactory,
    clock: Clock,
    pending: Vec<CacheEvent>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a cache from a configuration.
    pub fn new(config: CacheConfig<K, V>) -> Self {
        let trace = TraceIdFactory::new();
        let boundary = trace.next();
        Self {
            entries: PriorityLru::new(config.capacity),
            expiry: BTreeMap::new(),
            total_cost: 0,
            stats: CacheStats::default(),
            boundary,
            trace,
            clock: Clock::new(),
            pending: Vec::new(),
            config,
        }
    }

    /// Creates a cache bounded only by entry count.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(CacheConfig::builder().capacity(capacity).build())
    }

    /// Stores `value` under `key` with default priority and TTL.
    pub fn set(&mut self, key: K, value: V) -> Result<()> {
        self.set_with(key, value, EntryOptions::default())
    }

    /// Stores `value` under `key`, overwriting any previous entry.
    ///
    /// The effective TTL is the selected TTL plus a uniform sample from
    /// `[-jitter, +jitter]`, clamped at zero; a zero effective TTL stores
    /// nothing. If the value's cost alone exceeds the memory limit the write
    /// fails with [`CacheError::NotStorable`] and evicts nothing. Otherwise
    /// entries are evicted (expired first, then by priority and recency)
    /// until both bounds hold, and the entry is inserted.
    pub fn set_with(&mut self, key: K, value: V, options: EntryOptions) -> Result<()> {
        let outcome = self.write(key, Some(value), options);
        self.flush_events();
        outcome
    }

    /// Stores a known-absent marker under `key` with default options. Reads
    /// then report [`Lookup::HitAbsent`] until the marker expires, which
    /// suppresses repeated negative lookups upstream.
    pub fn set_absent(&mut self, key: K) -> Result<()> {
        self.set_absent_with(key, EntryOptions::default())
    }

    /// Stores a known-absent marker under `key`. Absent markers default to
    /// the configured `absent_ttl` and always cost zero.
    pub fn set_absent_with(&mut self, key: K, options: EntryOptions) -> Result<()> {
        let outcome = self.write(key, None, options);
        self.flush_events();
        outcome
    }

    /// Looks up `key`, touching the entry to most recently used on a hit.
    /// Expired entries are removed and reported as [`Lookup::Miss`].
    pub fn get(&mut self, key: &K) -> Lookup<V> {
        let valid = self.key_ok(key);
        let (lookup, snapshot) = self.get_prevalidated(key, valid);
        self.flush_events();
        if let Some(reporter) = self.config.stats_reporter.clone() {
            reporter(snapshot, lookup.kind());
        }
        lookup
    }

    /// Removes the entry for `key`, returning its value when one was present
    /// and not expired.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entry = self.remove_entry(key)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.value
    }

    /// Removes every expired entry, returning how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let mut purged = 0;
        while self.evict_expired_one(now) {
            purged += 1;
        }
        self.flush_events();
        purged
    }

    /// Removes every entry and rebases the trace id sequence. Statistics are
    /// kept; use [`reset_stats`](Self::reset_stats) to zero them.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.expiry.clear();
        self.total_cost = 0;
        self.trace.reset();
        self.boundary = self.trace.next();
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured entry-count limit.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Summed cost of resident values.
    pub fn cost(&self) -> u64 {
        self.total_cost
    }

    /// True when `key` is resident and not expired. Does not touch recency.
    pub fn contains(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// How long ago the resident entry for `key` was written, if it is
    /// still live. Does not touch recency.
    pub fn age(&self, key: &K) -> Option<Duration> {
        let now = self.clock.now();
        let entry = self.entries.peek(key)?;
        if entry.is_expired(now) {
            return None;
        }
        Some(now.saturating_duration_since(entry.inserted_at))
    }

    /// Snapshot of the lookup statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Zeroes the statistics and starts a new boundary id.
    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
        self.boundary = self.trace.next();
    }

    /// Trace id marking the start of the current statistics window.
    pub fn stats_boundary(&self) -> u64 {
        self.boundary
    }

    // ------------------------------------------------------------------
    // Internals shared with SharedCache. The `_prevalidated` entry points
    // run with key validation and cost computation already done, so a
    // wrapping lock is never held across user-supplied functions.
    // ------------------------------------------------------------------

    pub(crate) fn key_ok(&self, key: &K) -> bool {
        self.config.key_validator.as_ref().map_or(true, |v| v(key))
    }

    pub(crate) fn cost_of(&self, value: Option<&V>) -> u64 {
        if self.config.memory_limit == 0 {
            return 0;
        }
        match (value, self.config.cost_fn.as_ref()) {
            (Some(v), Some(cost_fn)) => cost_fn(v),
            _ => 0,
        }
    }

    pub(crate) fn note_invalid_key(&mut self) {
        self.stats.record(LookupKind::InvalidKey);
        self.push_event(|name, now| CacheEvent::InvalidKey {
            name,
            timestamp: now,
        });
    }

    fn write(&mut self, key: K, value: Option<V>, options: EntryOptions) -> Result<()> {
        if !self.key_ok(&key) {
            self.note_invalid_key();
            return Err(CacheError::InvalidKey);
        }
        let cost = self.cost_of(value.as_ref());
        self.write_prevalidated(key, value, cost, options)
    }

    pub(crate) fn write_prevalidated(
        &mut self,
        key: K,
        value: Option<V>,
        cost: u64,
        options: EntryOptions,
    ) -> Result<()> {
        if self.config.capacity == 0 {
            return Err(CacheError::Disabled);
        }
        let limit = self.config.memory_limit;
        if limit > 0 && cost > limit {
            self.push_event(|name, now| CacheEvent::Rejected {
                name,
                timestamp: now,
                cost,
                limit,
            });
            return Err(CacheError::NotStorable { cost, limit });
        }

        let now = self.clock.now();
        self.remove_entry(&key);

        let ttl = self.effective_ttl(value.is_some(), options.ttl);
        if ttl == Some(Duration::ZERO) {
            return Ok(());
        }

        while self.entries.len() >= self.config.capacity {
            self.evict_for(EvictionReason::CapacityLimit, now);
        }
        if limit > 0 {
            while self.total_cost + cost > limit {
                self.evict_for(EvictionReason::MemoryLimit, now);
            }
        }

        let entry = Entry {
            value,
            cost,
            inserted_at: now,
            expires_at: ttl.map(|d| now + d),
        };
        if let Some(at) = entry.expires_at {
            self.expiry.entry(at).or_default().push(key.clone());
        }
        self.total_cost += cost;
        let displaced = self.entries.put(key, entry, options.priority);
        debug_assert!(displaced.is_none(), "bounds were enforced before insert");
        Ok(())
    }

    pub(crate) fn get_prevalidated(&mut self, key: &K, valid: bool) -> (Lookup<V>, CacheStats) {
        let lookup = self.lookup(key, valid);
        self.stats.record(lookup.kind());
        (lookup, self.stats)
    }

    fn lookup(&mut self, key: &K, valid: bool) -> Lookup<V> {
        if !valid {
            self.push_event(|name, now| CacheEvent::InvalidKey {
                name,
                timestamp: now,
            });
            return Lookup::InvalidKey;
        }
        if self.config.capacity == 0 {
            self.push_event(|name, now| CacheEvent::Miss {
                name,
                timestamp: now,
            });
            return Lookup::Miss;
        }

        enum Found<V> {
            Missing,
            Expired,
            Present(V),
            Absent,
        }

        let now = self.clock.now();
        let found = match self.entries.get(key) {
            None => Found::Missing,
            Some(entry) if entry.is_expired(now) => Found::Expired,
            Some(entry) => match &entry.value {
                Some(v) => Found::Present(v.clone()),
                None => Found::Absent,
            },
        };

        match found {
            Found::Present(v) => {
                self.push_event(|name, now| CacheEvent::Hit {
                    name,
                    timestamp: now,
                });
                Lookup::Hit(v)
            }
            Found::Absent => {
                self.push_event(|name, now| CacheEvent::HitAbsent {
                    name,
                    timestamp: now,
                });
                Lookup::HitAbsent
            }
            Found::Expired => {
                self.remove_entry(key);
                self.push_event(|name, now| CacheEvent::Eviction {
                    name,
                    timestamp: now,
                    reason: EvictionReason::Expired,
                });
                self.push_event(|name, now| CacheEvent::Miss {
                    name,
                    timestamp: now,
                });
                Lookup::Miss
            }
            Found::Missing => {
                self.push_event(|name, now| CacheEvent::Miss {
                    name,
                    timestamp: now,
                });
                Lookup::Miss
            }
        }
    }

    pub(crate) fn purge_expired_quiet(&mut self) -> usize {
        let now = self.clock.now();
        let mut purged = 0;
        while self.evict_expired_one(now) {
            purged += 1;
        }
        purged
    }

    fn remove_entry(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.total_cost -= entry.cost;
        if let Some(at) = entry.expires_at {
            self.unindex_expiry(at, key);
        }
        Some(entry)
    }

    fn evict_for(&mut self, fallback: EvictionReason, now: Instant) {
        if self.evict_expired_one(now) {
            return;
        }
        if let Some((key, entry)) = self.entries.evict_one() {
            self.total_cost -= entry.cost;
            if let Some(at) = entry.expires_at {
                self.unindex_expiry(at, &key);
            }
            self.push_event(|name, now| CacheEvent::Eviction {
                name,
                timestamp: now,
                reason: fallback,
            });
        }
    }

    fn evict_expired_one(&mut self, now: Instant) -> bool {
        let Some((&at, _)) = self.expiry.first_key_value() else {
            return false;
        };
        if at > now {
            return false;
        }
        let keys = self.expiry.get_mut(&at).expect("instant was just observed");
        let key = keys.pop().expect("expiry buckets are removed when drained");
        if keys.is_empty() {
            self.expiry.remove(&at);
        }
        let entry = self.entries.remove(&key).expect("expiry index is exact");
        self.total_cost -= entry.cost;
        self.push_event(|name, now| CacheEvent::Eviction {
            name,
            timestamp: now,
            reason: EvictionReason::Expired,
        });
        true
    }

    fn unindex_expiry(&mut self, at: Instant, key: &K) {
        if let Some(keys) = self.expiry.get_mut(&at) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.expiry.remove(&at);
            }
        }
    }

    fn effective_ttl(&self, present: bool, ttl: Ttl) -> Option<Duration> {
        let base = match ttl {
            Ttl::Default => {
                if present {
                    self.config.default_ttl
                } else {
                    self.config.absent_ttl
                }
            }
            Ttl::After(d) => Some(d),
            Ttl::Never => None,
        }?;
        if self.config.ttl_jitter.is_zero() || base.is_zero() {
            return Some(base);
        }
        let jitter = self.config.ttl_jitter.as_nanos() as i64;
        let delta = rand::rng().random_range(-jitter..=jitter);
        let nanos = (base.as_nanos() as i64).saturating_add(delta).max(0);
        Some(Duration::from_nanos(nanos as u64))
    }

    fn push_event(&mut self, build: impl FnOnce(String, Instant) -> CacheEvent) {
        let now = self.clock.now();
        let event = build(self.config.name.clone(), now);
        self.pending.push(event);
    }

    pub(crate) fn take_events(&mut self) -> Vec<CacheEvent> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn emit_all(&self, events: Vec<CacheEvent>) {
        crate::events::dispatch(&self.config.name, &self.config.event_listeners, &events);
    }

    fn flush_events(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let events = self.take_events();
        self.emit_all(events);
    }

    pub(crate) fn config(&self) -> &CacheConfig<K, V> {
        &self.config
    }
}
