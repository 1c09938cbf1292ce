//! Configuration for the bounded cache.

use std::sync::Arc;
use std::time::Duration;

use keywork_core::{EventListeners, FnListener};

use crate::events::CacheEvent;
use crate::stats::{CacheStats, LookupKind};

/// Predicate deciding whether a key may enter the cache.
pub type KeyValidator<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;

/// Function computing the byte cost of a value for the memory bound.
pub type CostFn<V> = Arc<dyn Fn(&V) -> u64 + Send + Sync>;

/// Callback invoked after every lookup with a statistics snapshot and the
/// outcome that produced it.
pub type StatsReporter = Arc<dyn Fn(CacheStats, LookupKind) + Send + Sync>;

/// Configuration for [`BoundedCache`](crate::BoundedCache).
pub struct CacheConfig<K, V> {
    pub(crate) capacity: usize,
    pub(crate) memory_limit: u64,
    pub(crate) default_ttl: Option<Duration>,
    pub(crate) absent_ttl: Option<Duration>,
    pub(crate) ttl_jitter: Duration,
    pub(crate) key_validator: Option<KeyValidator<K>>,
    pub(crate) cost_fn: Option<CostFn<V>>,
    pub(crate) stats_reporter: Option<StatsReporter>,
    pub(crate) event_listeners: EventListeners<CacheEvent>,
    pub(crate) name: String,
}

impl<K, V> CacheConfig<K, V> {
    /// Creates a new configuration builder.
    pub fn builder() -> CacheConfigBuilder<K, V> {
        CacheConfigBuilder::new()
    }
}

impl<K, V> Default for CacheConfig<K, V> {
    fn default() -> Self {
        CacheConfigBuilder::new().build()
    }
}

impl<K, V> Clone for CacheConfig<K, V> {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            memory_limit: self.memory_limit,
            default_ttl: self.default_ttl,
            absent_ttl: self.absent_ttl,
            ttl_jitter: self.ttl_jitter,
            key_validator: self.key_validator.clone(),
            cost_fn: self.cost_fn.clone(),
            stats_reporter: self.stats_reporter.clone(),
            event_listeners: self.event_listeners.clone(),
            name: self.name.clone(),
        }
    }
}

/// Builder for [`CacheConfig`].
pub struct CacheConfigBuilder<K, V> {
    capacity: usize,
    memory_limit: u64,
    default_ttl: Option<Duration>,
    absent_ttl: Option<Duration>,
    ttl_jitter: Duration,
    key_validator: Option<KeyValidator<K>>,
    cost_fn: Option<CostFn<V>>,
    stats_reporter: Option<StatsReporter>,
    event_listeners: EventListeners<CacheEvent>,
    name: String,
}

impl<K, V> CacheConfigBuilder<K, V> {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            capacity: 1024,
            memory_limit: 0,
            default_ttl: None,
            absent_ttl: Some(Duration::from_secs(30)),
            ttl_jitter: Duration::ZERO,
            key_validator: None,
            cost_fn: None,
            stats_reporter: None,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the maximum number of entries. A capacity of zero disables the
    /// cache entirely: writes fail and lookups always miss.
    ///
    /// Default: 1024
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the maximum summed cost of resident values, as computed by
    /// [`cost_fn`](Self::cost_fn). Zero disables byte accounting.
    ///
    /// Default: 0 (disabled)
    pub fn memory_limit(mut self, limit: u64) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Sets the TTL applied when a write does not carry its own. Entries
    /// without a TTL from either source never expire.
    ///
    /// Default: no expiry
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Sets the TTL applied to stored absent markers. Negative results are
    /// usually kept on a shorter leash than real values.
    ///
    /// Default: 30 seconds
    pub fn absent_ttl(mut self, ttl: Duration) -> Self {
        self.absent_ttl = Some(ttl);
        self
    }

    /// Sets the half-range of the uniform randomization added to every
    /// effective TTL. Entries written together with the same nominal TTL then
    /// expire spread across `[-jitter, +jitter]`, which breaks reload
    /// stampedes.
    ///
    /// Default: zero (no jitter)
    pub fn ttl_jitter(mut self, jitter: Duration) -> Self {
        self.ttl_jitter = jitter;
        self
    }

    /// Sets a predicate that keys must pass. Writes with invalid keys fail
    /// and lookups report [`Lookup::InvalidKey`](crate::Lookup::InvalidKey).
    pub fn key_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) -> bool + Send + Sync + 'static,
    {
        self.key_validator = Some(Arc::new(f));
        self
    }

    /// Sets the function computing a value's cost for the memory bound.
    /// Without one, every value costs zero and only the entry count limits
    /// residency.
    pub fn cost_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&V) -> u64 + Send + Sync + 'static,
    {
        self.cost_fn = Some(Arc::new(f));
        self
    }

    /// Sets a callback invoked after every lookup with the statistics
    /// snapshot and the outcome class.
    pub fn stats_reporter<F>(mut self, f: F) -> Self
    where
        F: Fn(CacheStats, LookupKind) + Send + Sync + 'static,
    {
        self.stats_reporter = Some(Arc::new(f));
        self
    }

    /// Sets the name of this cache instance for observability.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback for lookups that return a present value.
    pub fn on_hit<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CacheEvent::Hit { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback for lookups that find nothing usable.
    pub fn on_miss<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CacheEvent::Miss { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback for evictions, whether forced by the bounds or
    /// by expiry.
    pub fn on_eviction<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CacheEvent::Eviction { .. }) {
                f();
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CacheConfig<K, V> {
        CacheConfig {
            capacity: self.capacity,
            memory_limit: self.memory_limit,
            default_ttl: self.default_ttl,
            absent_ttl: self.absent_ttl,
            ttl_jitter: self.ttl_jitter,
            key_validator: self.key_validator,
            cost_fn: self.cost_fn,
            stats_reporter: self.stats_reporter,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl<K, V> Default for CacheConfigBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
