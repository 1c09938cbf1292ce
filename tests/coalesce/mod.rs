//! Comprehensive tests for keywork-coalesce.
//!
//! - **concurrency**: single-flight guarantees under concurrent demand
//! - **retry**: backoff pacing and exhaustion
//! - **clear**: the three clear modes against an in-flight execution

mod clear;

use std::fmt;

/// Test error type for producers.
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
