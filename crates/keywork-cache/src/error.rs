//! Error types for the bounded cache.

/// Errors reported by cache writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The key was rejected by the configured validator.
    #[error("key rejected by validator")]
    InvalidKey,
    /// The entry's cost exceeds the memory limit on its own; nothing was
    /// evicted and the entry was not stored.
    #[error("entry cost ({cost}) exceeds the memory limit ({limit})")]
    NotStorable {
        /// Computed cost of the rejected value.
        cost: u64,
        /// Configured memory limit.
        limit: u64,
    },
    /// The cache was configured with a capacity of zero.
    #[error("cache is disabled (capacity 0)")]
    Disabled,
}

/// Result type for cache writes.
pub type Result<T> = std::result::Result<T, CacheError>;
