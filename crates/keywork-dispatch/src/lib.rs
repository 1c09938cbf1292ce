//! Keyed fetch dispatching for keywork.
//!
//! A [`Dispatcher`] coordinates many short keyed fetches against one
//! upstream [`Provider`]:
//!
//! - **Per-key coalescing**: concurrent demand for one key shares a single
//!   provider invocation, and every subscriber receives the same outcome.
//! - **Priority admission**: a bounded queue feeds a bounded running set;
//!   the highest-priority key runs next, ties broken FIFO or LIFO. Overflow
//!   displaces the least valuable queued fetch and tells its subscribers.
//! - **Batching**: a batch provider drains up to `max_batch` queued keys in
//!   priority order into one upstream round trip.
//! - **Result caching**: completed values land in a
//!   [`SharedCache`](keywork_cache::SharedCache) and later fetches are
//!   answered from it, TTL, jitter and negative caching included.
//!
//! # Example
//!
//! ```rust
//! use keywork_cache::CacheConfig;
//! use keywork_dispatch::{DispatchConfig, Dispatcher, Provider};
//!
//! # #[derive(Debug, Clone)]
//! # struct HttpError;
//! # async fn example() {
//! let provider = Provider::async_fn(|asset: String| async move {
//!     Ok::<_, HttpError>(format!("bytes of {asset}"))
//! });
//!
//! let config = DispatchConfig::builder(provider)
//!     .max_running(4)
//!     .max_queued(256)
//!     .result_cache(CacheConfig::builder().capacity(512).build())
//!     .name("assets")
//!     .build();
//! let dispatcher = Dispatcher::new(config);
//!
//! let body = dispatcher.fetch("logo.png".to_string()).await.unwrap();
//! # let _ = body;
//! # }
//! ```

mod config;
mod error;
mod events;
mod manager;
mod provider;

pub use config::{DispatchConfig, DispatchConfigBuilder};
pub use error::DispatchError;
pub use events::DispatchEvent;
pub use manager::{Dispatcher, FetchHandle};
pub use provider::Provider;

pub use keywork_core::AdmissionPolicy;
