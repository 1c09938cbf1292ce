//! Events emitted by the job manager.

use std::time::Instant;

use keywork_core::CoordinationEvent;

/// Events emitted by job manager operations.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A provider was started (fresh or resumed).
    Started {
        /// Manager instance name.
        name: String,
        /// When the provider started.
        timestamp: Instant,
        /// True when a retained provider instance was resumed.
        resumed: bool,
    },
    /// A running provider was stopped to make room for higher priority.
    Preempted {
        /// Manager instance name.
        name: String,
        /// When the preemption completed.
        timestamp: Instant,
        /// True when the provider instance was kept for a later resume.
        reuse: bool,
    },
    /// A queued job was displaced by the admission policy.
    Evicted {
        /// Manager instance name.
        name: String,
        /// When the displacement happened.
        timestamp: Instant,
    },
    /// A job was cancelled.
    Cancelled {
        /// Manager instance name.
        name: String,
        /// When the cancellation settled.
        timestamp: Instant,
    },
    /// A job delivered a successful terminal result.
    Completed {
        /// Manager instance name.
        name: String,
        /// When the result was delivered.
        timestamp: Instant,
    },
    /// A job delivered a failed terminal result.
    Failed {
        /// Manager instance name.
        name: String,
        /// When the failure was delivered.
        timestamp: Instant,
    },
    /// A provider ignored its stop call past the grace window and was
    /// abandoned.
    StopTimedOut {
        /// Manager instance name.
        name: String,
        /// When the grace window elapsed.
        timestamp: Instant,
    },
}

impl CoordinationEvent for JobEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JobEvent::Started { .. } => "started",
            JobEvent::Preempted { .. } => "preempted",
            JobEvent::Evicted { .. } => "evicted",
            JobEvent::Cancelled { .. } => "cancelled",
            JobEvent::Completed { .. } => "completed",
            JobEvent::Failed { .. } => "failed",
            JobEvent::StopTimedOut { .. } => "stop_timed_out",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            JobEvent::Started { timestamp, .. }
            | JobEvent::Preempted { timestamp, .. }
            | JobEvent::Evicted { timestamp, .. }
            | JobEvent::Cancelled { timestamp, .. }
            | JobEvent::Completed { timestamp, .. }
            | JobEvent::Failed { timestamp, .. }
            | JobEvent::StopTimedOut { timestamp, .. } => *timestamp,
        }
    }

    fn source_name(&self) -> &str {
        match self {
            JobEvent::Started { name, .. }
            | JobEvent::Preempted { name, .. }
            | JobEvent::Evicted { name, .. }
            | JobEvent::Cancelled { name, .. }
            | JobEvent::Completed { name, .. }
            | JobEvent::Failed { name, .. }
            | JobEvent::StopTimedOut { name, .. } => name,
        }
    }
}
