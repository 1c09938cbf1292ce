//! Comprehensive tests for keywork-cache.
//!
//! - **bounds**: the dual entry-count/byte-cost limits and eviction order
//! - **ttl**: expiry, jitter spreading, purging
//! - **stats**: outcome counters, hit rate, the reporter callback

mod stats;
