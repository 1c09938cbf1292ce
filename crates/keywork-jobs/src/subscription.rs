//! Per-subscriber update stream.

use tokio::sync::mpsc;

use crate::error::JobError;

/// One update on a job subscription.
#[derive(Debug, Clone)]
pub enum JobUpdate<V, E, Ev> {
    /// A progress event emitted by the provider.
    Event(Ev),
    /// The terminal result. Nothing follows it.
    Done(Result<V, JobError<E>>),
}

/// A subscriber's view of one job.
///
/// Every subscriber owns its own ordered stream: provider events arrive in
/// emission order and the terminal result arrives after all of them, exactly
/// once. Subscribers registered after the job started first receive a replay
/// of the most recent events so they can pick up current progress.
///
/// Dropping the subscription detaches the subscriber; the job itself keeps
/// running for anyone else.
pub struct JobSubscription<V, E, Ev> {
    pub(crate) rx: mpsc::UnboundedReceiver<JobUpdate<V, E, Ev>>,
}

impl<V, E, Ev> JobSubscription<V, E, Ev> {
    /// The next update, or `None` once the terminal result was consumed.
    pub async fn next(&mut self) -> Option<JobUpdate<V, E, Ev>> {
        self.rx.recv().await
    }

    /// Skips remaining progress events and resolves to the terminal result.
    pub async fn result(mut self) -> Result<V, JobError<E>> {
        while let Some(update) = self.rx.recv().await {
            if let JobUpdate::Done(result) = update {
                return result;
            }
        }
        Err(JobError::Lost)
    }

    /// Collects every remaining update until the terminal result, returning
    /// the events and the result together.
    pub async fn collect(mut self) -> (Vec<Ev>, Result<V, JobError<E>>) {
        let mut events = Vec::new();
        while let Some(update) = self.rx.recv().await {
            match update {
                JobUpdate::Event(event) => events.push(event),
                JobUpdate::Done(result) => return (events, result),
            }
        }
        (events, Err(JobError::Lost))
    }
}
