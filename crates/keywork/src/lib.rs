//! Task coordination and in-memory caching for client-side systems.
//!
//! keywork helps applications cache keyed values with bounded memory and
//! expiration, deduplicate expensive async work, and schedule large numbers
//! of keyed tasks with bounded concurrency and priority admission. Each
//! component lives in its own crate and is re-exported here behind a
//! feature flag:
//!
//! | Feature | Component |
//! |---------|-----------|
//! | `cache` | [`cache`] — bounded priority/TTL cache with negative caching |
//! | `coalesce` | [`coalesce`] — single-flight execution with retry |
//! | `dispatch` | [`dispatch`] — keyed fetch dispatcher with batching |
//! | `jobs` | [`jobs`] — resumable keyed jobs with preemption |
//! | `full` | all of the above |
//!
//! The shared infrastructure (event listeners, admission policy, clock,
//! trace ids) is always available under [`core`].
//!
//! # Example
//!
//! A dispatcher in front of a TTL'd result cache, with single-flight
//! semantics per key:
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use keywork::cache::CacheConfig;
//! use keywork::dispatch::{DispatchConfig, Dispatcher, Provider};
//!
//! let provider = Provider::async_fn(|id: u64| async move {
//!     Ok::<_, MyError>(load_profile(id).await?)
//! });
//!
//! let dispatcher = Dispatcher::new(
//!     DispatchConfig::builder(provider)
//!         .max_running(4)
//!         .result_cache(
//!             CacheConfig::builder()
//!                 .capacity(1024)
//!                 .default_ttl(Duration::from_secs(300))
//!                 .ttl_jitter(Duration::from_secs(30))
//!                 .build(),
//!         )
//!         .build(),
//! );
//! ```

/// Shared infrastructure: events, clock, trace ids, admission queue.
pub mod core {
    pub use keywork_core::*;
}

/// Bounded priority/TTL caching.
#[cfg(feature = "cache")]
pub mod cache {
    pub use keywork_cache::*;
}

/// Single-flight execution.
#[cfg(feature = "coalesce")]
pub mod coalesce {
    pub use keywork_coalesce::*;
}

/// Keyed fetch dispatching.
#[cfg(feature = "dispatch")]
pub mod dispatch {
    pub use keywork_dispatch::*;
}

/// Resumable keyed jobs.
#[cfg(feature = "jobs")]
pub mod jobs {
    pub use keywork_jobs::*;
}
