//! Resumable keyed jobs for keywork.
//!
//! A [`JobManager`] coordinates long-lived work (downloads, extraction,
//! media processing) keyed by an identifier:
//!
//! - **One provider per key**: a user-defined [`JobProvider`] owns the work;
//!   any number of subscribers share it and receive its typed progress
//!   events in emission order, then exactly one terminal result.
//! - **Bounded concurrency with preemption**: when a higher-priority key
//!   arrives at capacity, the lowest-priority running provider is stopped.
//!   An instance that answers [`StopAction::Reuse`] keeps its state (partial
//!   buffer, resume token) and resumes from the head of its priority bucket.
//! - **Grace-window stops**: a provider that ignores `stop` past the
//!   configured window is abandoned rather than waited on.
//! - **Result caching**: finished values can land in a
//!   [`SharedCache`](keywork_cache::SharedCache) so repeated demand skips
//!   the provider entirely.
//!
//! The manager never retries a failed job; whether and how to retry is the
//! provider's decision.
//!
//! # Example
//!
//! ```rust
//! use keywork_jobs::{JobConfig, JobContext, JobManager, JobProvider, StopAction};
//!
//! # #[derive(Debug, Clone)]
//! # struct DownloadError;
//! struct Download {
//!     ctx: JobContext<Vec<u8>, DownloadError, u8>,
//! }
//!
//! impl JobProvider<Vec<u8>, DownloadError, u8> for Download {
//!     fn start(&mut self) {
//!         let ctx = self.ctx.clone();
//!         tokio::spawn(async move {
//!             ctx.emit(50); // percent complete
//!             ctx.complete(Ok(vec![1, 2, 3]));
//!         });
//!     }
//!
//!     fn stop(&mut self) -> StopAction {
//!         StopAction::Dealloc
//!     }
//! }
//!
//! # async fn example() {
//! let manager = JobManager::new(
//!     JobConfig::builder(|_url: &String, ctx| Download { ctx })
//!         .max_running(2)
//!         .build(),
//! );
//!
//! let bytes = manager
//!     .fetch("https://example.com/archive".to_string())
//!     .result()
//!     .await
//!     .unwrap();
//! # let _ = bytes;
//! # }
//! ```

mod config;
mod error;
mod events;
mod manager;
mod provider;
mod subscription;

pub use config::{JobConfig, JobConfigBuilder};
pub use error::JobError;
pub use events::JobEvent;
pub use manager::JobManager;
pub use provider::{JobContext, JobProvider, ProviderFactory, StopAction};
pub use subscription::{JobSubscription, JobUpdate};

pub use keywork_core::AdmissionPolicy;
