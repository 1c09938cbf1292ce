//! Error type for job subscriptions.

/// Terminal failure of a job, as seen by a subscriber.
#[derive(Debug)]
pub enum JobError<E> {
    /// The provider completed with an error. The manager does not retry
    /// heavy jobs; retrying is the provider's decision.
    Provider(E),
    /// The job was cancelled via [`JobManager::cancel`](crate::JobManager::cancel).
    Cancelled,
    /// The queued job was displaced by the admission policy before it could
    /// run.
    EvictedDueToPriority,
    /// Cancellation stopped waiting for the provider after the grace
    /// window; the instance was abandoned.
    StopTimedOut,
    /// The provider's `start` panicked; the panic was contained.
    Panicked,
    /// The job disappeared without resolving. This is a defensive terminal
    /// for a dropped subscription channel.
    Lost,
}

impl<E: std::fmt::Display> std::fmt::Display for JobError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::Provider(e) => write!(f, "provider failed: {}", e),
            JobError::Cancelled => write!(f, "job was cancelled"),
            JobError::EvictedDueToPriority => {
                write!(f, "job was displaced from the admission queue")
            }
            JobError::StopTimedOut => {
                write!(f, "provider did not stop within the grace window")
            }
            JobError::Panicked => write!(f, "provider panicked during start"),
            JobError::Lost => write!(f, "job dropped without resolving"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for JobError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JobError::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Clone> Clone for JobError<E> {
    fn clone(&self) -> Self {
        match self {
            JobError::Provider(e) => JobError::Provider(e.clone()),
            JobError::Cancelled => JobError::Cancelled,
            JobError::EvictedDueToPriority => JobError::EvictedDueToPriority,
            JobError::StopTimedOut => JobError::StopTimedOut,
            JobError::Panicked => JobError::Panicked,
            JobError::Lost => JobError::Lost,
        }
    }
}

impl<E: PartialEq> PartialEq for JobError<E> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JobError::Provider(a), JobError::Provider(b)) => a == b,
            (JobError::Cancelled, JobError::Cancelled)
            | (JobError::EvictedDueToPriority, JobError::EvictedDueToPriority)
            | (JobError::StopTimedOut, JobError::StopTimedOut)
            | (JobError::Panicked, JobError::Panicked)
            | (JobError::Lost, JobError::Lost) => true,
            _ => false,
        }
    }
}
