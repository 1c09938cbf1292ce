//! Error type for coalesced executions.

/// Terminal failure of a coalesced execution.
#[derive(Debug)]
pub enum CoalesceError<E> {
    /// The producer failed and no retries were configured.
    Producer(E),
    /// The producer kept failing until the retry policy gave up; carries the
    /// last underlying error.
    RetryExhausted(E),
    /// The execution was cancelled via [`ClearMode::Cancel`](crate::ClearMode::Cancel).
    Cancelled,
    /// The execution disappeared without resolving. This is a defensive
    /// terminal for a dropped completion channel.
    Lost,
    /// The producer panicked; the panic was contained and surfaced here.
    Panicked,
}

impl<E: std::fmt::Display> std::fmt::Display for CoalesceError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoalesceError::Producer(e) => write!(f, "producer failed: {}", e),
            CoalesceError::RetryExhausted(e) => write!(f, "retries exhausted, last error: {}", e),
            CoalesceError::Cancelled => write!(f, "execution was cancelled"),
            CoalesceError::Lost => write!(f, "execution dropped without resolving"),
            CoalesceError::Panicked => write!(f, "producer panicked"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CoalesceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoalesceError::Producer(e) | CoalesceError::RetryExhausted(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Clone> Clone for CoalesceError<E> {
    fn clone(&self) -> Self {
        match self {
            CoalesceError::Producer(e) => CoalesceError::Producer(e.clone()),
            CoalesceError::RetryExhausted(e) => CoalesceError::RetryExhausted(e.clone()),
            CoalesceError::Cancelled => CoalesceError::Cancelled,
            CoalesceError::Lost => CoalesceError::Lost,
            CoalesceError::Panicked => CoalesceError::Panicked,
        }
    }
}

impl<E: PartialEq> PartialEq for CoalesceError<E> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CoalesceError::Producer(a), CoalesceError::Producer(b)) => a == b,
            (CoalesceError::RetryExhausted(a), CoalesceError::RetryExhausted(b)) => a == b,
            (CoalesceError::Cancelled, CoalesceError::Cancelled)
            | (CoalesceError::Lost, CoalesceError::Lost)
            | (CoalesceError::Panicked, CoalesceError::Panicked) => true,
            _ => false,
        }
    }
}
