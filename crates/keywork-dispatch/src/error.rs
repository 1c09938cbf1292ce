//! Error type for dispatched fetches.

/// Terminal failure of a dispatched fetch.
#[derive(Debug)]
pub enum DispatchError<E> {
    /// The provider failed and no retries were configured.
    Provider(E),
    /// The provider kept failing until the retry policy gave up; carries the
    /// last underlying error.
    RetryExhausted(E),
    /// The fetch was cancelled via [`Dispatcher::cancel`](crate::Dispatcher::cancel).
    Cancelled,
    /// The queued fetch was displaced by the admission policy before it
    /// could run.
    EvictedDueToPriority,
    /// A batched provider resolved the batch without this key.
    MissingResult,
    /// The provider panicked; the panic was contained and surfaced here.
    Panicked,
    /// The fetch disappeared without resolving. This is a defensive terminal
    /// for a dropped completion channel.
    Lost,
}

impl<E: std::fmt::Display> std::fmt::Display for DispatchError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Provider(e) => write!(f, "provider failed: {}", e),
            DispatchError::RetryExhausted(e) => {
                write!(f, "retries exhausted, last error: {}", e)
            }
            DispatchError::Cancelled => write!(f, "fetch was cancelled"),
            DispatchError::EvictedDueToPriority => {
                write!(f, "fetch was displaced from the admission queue")
            }
            DispatchError::MissingResult => {
                write!(f, "batched provider returned no result for this key")
            }
            DispatchError::Panicked => write!(f, "provider panicked"),
            DispatchError::Lost => write!(f, "fetch dropped without resolving"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for DispatchError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Provider(e) | DispatchError::RetryExhausted(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Clone> Clone for DispatchError<E> {
    fn clone(&self) -> Self {
        match self {
            DispatchError::Provider(e) => DispatchError::Provider(e.clone()),
            DispatchError::RetryExhausted(e) => DispatchError::RetryExhausted(e.clone()),
            DispatchError::Cancelled => DispatchError::Cancelled,
            DispatchError::EvictedDueToPriority => DispatchError::EvictedDueToPriority,
            DispatchError::MissingResult => DispatchError::MissingResult,
            DispatchError::Panicked => DispatchError::Panicked,
            DispatchError::Lost => DispatchError::Lost,
        }
    }
}

impl<E: PartialEq> PartialEq for DispatchError<E> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DispatchError::Provider(a), DispatchError::Provider(b)) => a == b,
            (DispatchError::RetryExhausted(a), DispatchError::RetryExhausted(b)) => a == b,
            (DispatchError::Cancelled, DispatchError::Cancelled)
            | (DispatchError::EvictedDueToPriority, DispatchError::EvictedDueToPriority)
            | (DispatchError::MissingResult, DispatchError::MissingResult)
            | (DispatchError::Panicked, DispatchError::Panicked)
            | (DispatchError::Lost, DispatchError::Lost) => true,
            _ => false,
        }
    }
}
