//! Comprehensive tests for keywork-dispatch.
//!
//! - **coalescing**: per-key deduplication and result-cache accounting
//! - **admission**: priority ordering, FIFO/LIFO ties, queue displacement
//! - **batching**: multi-key providers and batch coalescing

mod admission;
mod batching;
mod coalescing;

use std::fmt;

/// Test error type for providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError {
    pub message: String,
}

impl TestError {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestError: {}", self.message)
    }
}

impl std::error::Error for TestError {}
