//! Single-flight execution for keywork.
//!
//! This crate guards one expensive async computation so that concurrent
//! demand produces a single underlying execution, preventing "cache
//! stampede" and "thundering herd" problems.
//!
//! # How it works
//!
//! 1. The first request after idle starts the producer
//! 2. Requests arriving while it runs join as waiters
//! 3. Every waiter receives a clone of the one outcome, success or failure
//! 4. A success stays cached for the configured freshness window; later
//!    requests are answered without touching the producer
//!
//! Failures consult a [`RetryPolicy`] (fixed, exponential or custom backoff)
//! before the waiters see an error, and [`Coalescer::clear`] defines exact
//! semantics for an in-flight execution: cancel it, let it finish uncached,
//! or restart it once it settles.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use keywork_coalesce::{Coalescer, CoalesceConfig, RetryPolicy};
//!
//! # #[derive(Debug, Clone)]
//! # struct FetchError;
//! # async fn example() {
//! let config = CoalesceConfig::builder()
//!     .retry(RetryPolicy::exponential(3, Duration::from_millis(100)))
//!     .result_ttl(Duration::from_secs(60))
//!     .name("exchange-rates")
//!     .build();
//!
//! let rates: Coalescer<Vec<f64>, FetchError> = Coalescer::with_config(
//!     || async {
//!         // however many tasks ask at once, this runs once
//!         Ok(vec![1.08, 0.79])
//!     },
//!     config,
//! );
//!
//! let value = rates.execute().await.unwrap();
//! # let _ = value;
//! # }
//! ```
//!
//! # Prior art
//!
//! The pattern is also known as **singleflight** (Go's
//! `golang.org/x/sync/singleflight`), request deduplication, or request
//! collapsing; this rendition adds the result freshness window, retries and
//! the explicit clear protocol.

mod backoff;
mod config;
mod error;
mod single;

pub use backoff::{ExponentialBackoff, FixedInterval, FnInterval, IntervalFunction, RetryPolicy};
pub use config::{CoalesceConfig, CoalesceConfigBuilder};
pub use error::CoalesceError;
pub use single::{ClearMode, Coalescer, Execution};
