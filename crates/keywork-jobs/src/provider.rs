//! The provider contract for long-lived jobs.

use std::sync::Arc;

/// What a stopped provider instance becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAction {
    /// The instance kept no useful state; discard it. A later demand for the
    /// key constructs a fresh provider.
    Dealloc,
    /// The instance retains enough state (partial buffer, resume token) that
    /// a later `start` continues where it left off; keep it.
    Reuse,
}

/// A long-lived, possibly resumable unit of work bound to one key.
///
/// The manager constructs one provider per key through the configured
/// factory, handing it a [`JobContext`] for emission. `start` begins or
/// resumes the work and should return quickly — long work belongs on a task
/// or thread the provider owns. `stop` cancels the work and reports whether
/// this instance is worth keeping for a resume.
///
/// The provider emits any number of typed progress events and exactly one
/// terminal result through its context. Both `start` and `stop` are invoked
/// outside the manager's lock.
pub trait JobProvider<V, E, Ev>: Send + 'static {
    /// Begins or resumes the work.
    fn start(&mut self);

    /// Cancels the work. The manager enforces a grace window around this
    /// call; an instance that does not return in time is abandoned as if it
    /// had answered [`StopAction::Dealloc`].
    fn stop(&mut self) -> StopAction;
}

/// Constructs a provider for a key. The context is the provider's only way
/// back to the manager and holds no strong reference to it.
pub type ProviderFactory<K, V, E, Ev> =
    Arc<dyn Fn(&K, JobContext<V, E, Ev>) -> Box<dyn JobProvider<V, E, Ev>> + Send + Sync>;

/// Emission handles given to a provider at construction.
///
/// Both handles are cheap to clone and safe to use from any thread the
/// provider runs work on. Emissions from a provider generation that the
/// manager has since cancelled or replaced are discarded silently.
pub struct JobContext<V, E, Ev> {
    pub(crate) emit_event: Arc<dyn Fn(Ev) + Send + Sync>,
    pub(crate) complete: Arc<dyn Fn(Result<V, E>) + Send + Sync>,
}

impl<V, E, Ev> Clone for JobContext<V, E, Ev> {
    fn clone(&self) -> Self {
        Self {
            emit_event: Arc::clone(&self.emit_event),
            complete: Arc::clone(&self.complete),
        }
    }
}

impl<V, E, Ev> JobContext<V, E, Ev> {
    /// Broadcasts a progress event to every subscriber of this job.
    pub fn emit(&self, event: Ev) {
        (self.emit_event)(event);
    }

    /// Delivers the terminal result. Subscribers receive it after every
    /// event emitted before this call; further completions are ignored.
    pub fn complete(&self, result: Result<V, E>) {
        (self.complete)(result);
    }
}
