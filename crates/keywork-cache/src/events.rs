//! Events emitted by the bounded cache.

use std::time::Instant;

use keywork_core::CoordinationEvent;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The entry was past its expiry instant.
    Expired,
    /// The entry-count limit forced it out.
    CapacityLimit,
    /// The byte-cost limit forced it out.
    MemoryLimit,
}

/// Events emitted by cache operations.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A lookup returned a present value.
    Hit {
        /// Cache instance name.
        name: String,
        /// When the lookup happened.
        timestamp: Instant,
    },
    /// A lookup returned a stored absent marker.
    HitAbsent {
        /// Cache instance name.
        name: String,
        /// When the lookup happened.
        timestamp: Instant,
    },
    /// A lookup found nothing usable.
    Miss {
        /// Cache instance name.
        name: String,
        /// When the lookup happened.
        timestamp: Instant,
    },
    /// A key failed validation.
    InvalidKey {
        /// Cache instance name.
        name: String,
        /// When the operation happened.
        timestamp: Instant,
    },
    /// An entry was evicted.
    Eviction {
        /// Cache instance name.
        name: String,
        /// When the eviction happened.
        timestamp: Instant,
        /// What forced the entry out.
        reason: EvictionReason,
    },
    /// A value was refused because its cost alone exceeds the memory limit.
    Rejected {
        /// Cache instance name.
        name: String,
        /// When the write was refused.
        timestamp: Instant,
        /// Computed cost of the refused value.
        cost: u64,
        /// Configured memory limit.
        limit: u64,
    },
}

impl CoordinationEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "hit",
            CacheEvent::HitAbsent { .. } => "hit_absent",
            CacheEvent::Miss { .. } => "miss",
            CacheEvent::InvalidKey { .. } => "invalid_key",
            CacheEvent::Eviction { .. } => "eviction",
            CacheEvent::Rejected { .. } => "rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::HitAbsent { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::InvalidKey { timestamp, .. }
            | CacheEvent::Eviction { timestamp, .. }
            | CacheEvent::Rejected { timestamp, .. } => *timestamp,
        }
    }

    fn source_name(&self) -> &str {
        match self {
            CacheEvent::Hit { name, .. }
            | CacheEvent::HitAbsent { name, .. }
            | CacheEvent::Miss { name, .. }
            | CacheEvent::InvalidKey { name, .. }
            | CacheEvent::Eviction { name, .. }
            | CacheEvent::Rejected { name, .. } => name,
        }
    }
}

/// Fans `events` out to listeners, with cfg-gated tracing/metrics taps.
/// Callers run this outside any cache lock so listeners never execute
/// inside a critical section.
pub(crate) fn dispatch(
    name: &str,
    listeners: &keywork_core::EventListeners<CacheEvent>,
    events: &[CacheEvent],
) {
    for event in events {
        #[cfg(feature = "tracing")]
        if let CacheEvent::Eviction { reason, .. } = event {
            tracing::debug!(cache = %name, ?reason, "cache eviction");
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "keywork_cache_outcomes_total",
            "cache" => name.to_string(),
            "outcome" => event.event_type()
        )
        .increment(1);

        #[cfg(not(any(feature = "tracing", feature = "metrics")))]
        let _ = name;

        listeners.emit(event);
    }
}
