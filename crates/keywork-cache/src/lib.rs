//! Bounded priority/TTL caching for keywork.
//!
//! This crate provides an in-memory key→value store with the controls a
//! client-side cache actually needs in practice:
//!
//! - **Dual bounds**: an entry-count limit and an optional byte-cost limit,
//!   enforced together on every write.
//! - **Priority eviction**: entries carry an `f64` priority; the eviction
//!   victim is always the least recently touched entry of the lowest
//!   priority. Single-priority usage degrades to plain LRU.
//! - **Per-entry TTL with jitter**: every TTL gets a uniform random nudge in
//!   `[-jitter, +jitter]`, so entries written together do not expire
//!   together and trigger a reload stampede.
//! - **Negative caching**: a key can be marked *known absent*, a distinct
//!   outcome from a miss, with its own (typically shorter) TTL.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use keywork_cache::{BoundedCache, CacheConfig, Lookup};
//!
//! let config = CacheConfig::builder()
//!     .capacity(100)
//!     .memory_limit(1 << 20)
//!     .cost_fn(|v: &Vec<u8>| v.len() as u64)
//!     .default_ttl(Duration::from_secs(300))
//!     .ttl_jitter(Duration::from_secs(30))
//!     .name("thumbnails")
//!     .build();
//! let mut cache = BoundedCache::new(config);
//!
//! cache.set("user-1", vec![1, 2, 3]).unwrap();
//! assert!(matches!(cache.get(&"user-1"), Lookup::Hit(_)));
//!
//! // The backend said this key does not exist; remember that too.
//! cache.set_absent("user-404").unwrap();
//! assert_eq!(cache.get(&"user-404"), Lookup::HitAbsent);
//! ```
//!
//! # Choosing a handle
//!
//! [`BoundedCache`] takes `&mut self` and leaves synchronization to the
//! caller. [`SharedCache`] wraps the same store in a clonable handle with an
//! internal mutex; user-supplied functions (validators, cost functions,
//! listeners, the stats reporter) always run outside that lock.

mod config;
mod error;
mod events;
mod priority_lru;
mod shared;
mod stats;
mod store;

pub use config::{CacheConfig, CacheConfigBuilder, CostFn, KeyValidator, StatsReporter};
pub use error::{CacheError, Result};
pub use events::{CacheEvent, EvictionReason};
pub use priority_lru::PriorityLru;
pub use shared::SharedCache;
pub use stats::{CacheStats, LookupKind};
pub use store::{BoundedCache, EntryOptions, Lookup, Ttl};
