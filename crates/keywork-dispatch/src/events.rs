//! Events emitted by the dispatcher.

use std::time::Instant;

use keywork_core::CoordinationEvent;

/// Events emitted by dispatcher operations.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A fetch completed successfully and its subscribers were notified.
    Completed {
        /// Dispatcher instance name.
        name: String,
        /// When the fetch completed.
        timestamp: Instant,
    },
    /// A fetch failed terminally.
    Failed {
        /// Dispatcher instance name.
        name: String,
        /// When the fetch failed.
        timestamp: Instant,
    },
    /// A queued fetch was displaced by the admission policy.
    Evicted {
        /// Dispatcher instance name.
        name: String,
        /// When the displacement happened.
        timestamp: Instant,
    },
    /// A fetch was cancelled.
    Cancelled {
        /// Dispatcher instance name.
        name: String,
        /// When the cancellation happened.
        timestamp: Instant,
    },
    /// A batch of keys was handed to the provider.
    BatchDispatched {
        /// Dispatcher instance name.
        name: String,
        /// When the batch left the queue.
        timestamp: Instant,
        /// Number of keys in the batch.
        size: usize,
    },
}

impl CoordinationEvent for DispatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DispatchEvent::Completed { .. } => "completed",
            DispatchEvent::Failed { .. } => "failed",
            DispatchEvent::Evicted { .. } => "evicted",
            DispatchEvent::Cancelled { .. } => "cancelled",
            DispatchEvent::BatchDispatched { .. } => "batch_dispatched",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            DispatchEvent::Completed { timestamp, .. }
            | DispatchEvent::Failed { timestamp, .. }
            | DispatchEvent::Evicted { timestamp, .. }
            | DispatchEvent::Cancelled { timestamp, .. }
            | DispatchEvent::BatchDispatched { timestamp, .. } => *timestamp,
        }
    }

    fn source_name(&self) -> &str {
        match self {
            DispatchEvent::Completed { name, .. }
            | DispatchEvent::Failed { name, .. }
            | DispatchEvent::Evicted { name, .. }
            | DispatchEvent::Cancelled { name, .. }
            | DispatchEvent::BatchDispatched { name, .. } => name,
        }
    }
}
