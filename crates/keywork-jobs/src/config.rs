//! Configuration for the job manager.

use std::sync::Arc;
use std::time::Duration;

use keywork_cache::CacheConfig;
use keywork_core::{AdmissionPolicy, EventListeners, FnListener};
use tokio::runtime::Handle;

use crate::events::JobEvent;
use crate::provider::{JobContext, JobProvider, ProviderFactory};

/// Configuration for [`JobManager`](crate::JobManager).
pub struct JobConfig<K, V, E, Ev> {
    pub(crate) factory: ProviderFactory<K, V, E, Ev>,
    pub(crate) max_running: usize,
    pub(crate) max_queued: usize,
    pub(crate) policy: AdmissionPolicy,
    pub(crate) stop_grace: Duration,
    pub(crate) cache: Option<CacheConfig<K, V>>,
    pub(crate) runtime: Option<Handle>,
    pub(crate) event_listeners: EventListeners<JobEvent>,
    pub(crate) name: String,
}

impl<K, V, E, Ev> JobConfig<K, V, E, Ev> {
    /// Creates a builder around a provider factory. The factory is invoked
    /// once per fresh admission of a key.
    pub fn builder<F, P>(factory: F) -> JobConfigBuilder<K, V, E, Ev>
    where
        F: Fn(&K, JobContext<V, E, Ev>) -> P + Send + Sync + 'static,
        P: JobProvider<V, E, Ev>,
    {
        JobConfigBuilder::new(factory)
    }
}

/// Builder for [`JobConfig`].
pub struct JobConfigBuilder<K, V, E, Ev> {
    factory: ProviderFactory<K, V, E, Ev>,
    max_running: usize,
    max_queued: usize,
    policy: AdmissionPolicy,
    stop_grace: Duration,
    cache: Option<CacheConfig<K, V>>,
    runtime: Option<Handle>,
    event_listeners: EventListeners<JobEvent>,
    name: String,
}

impl<K, V, E, Ev> JobConfigBuilder<K, V, E, Ev> {
    /// Creates a new builder with default values.
    pub fn new<F, P>(factory: F) -> Self
    where
        F: Fn(&K, JobContext<V, E, Ev>) -> P + Send + Sync + 'static,
        P: JobProvider<V, E, Ev>,
    {
        Self {
            factory: Arc::new(move |key, ctx| Box::new(factory(key, ctx)) as Box<dyn JobProvider<V, E, Ev>>),
            max_running: 2,
            max_queued: 64,
            policy: AdmissionPolicy::Fifo,
            stop_grace: Duration::from_secs(5),
            cache: None,
            runtime: None,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the number of providers allowed to run at once.
    ///
    /// Default: 2
    pub fn max_running(mut self, max: usize) -> Self {
        self.max_running = max.max(1);
        self
    }

    /// Sets the admission-queue capacity.
    ///
    /// Default: 64
    pub fn max_queued(mut self, max: usize) -> Self {
        self.max_queued = max;
        self
    }

    /// Sets the tie-breaking policy for equal priorities.
    ///
    /// Default: FIFO
    pub fn policy(mut self, policy: AdmissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets how long a `stop` call may take before the provider instance is
    /// abandoned and treated as [`StopAction::Dealloc`](crate::StopAction::Dealloc).
    ///
    /// Default: 5 seconds
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Enables a result cache: terminal values land in it, and later
    /// fetches of a finished key are answered without a provider.
    ///
    /// Default: no result cache
    pub fn result_cache(mut self, cache: CacheConfig<K, V>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the runtime provider lifecycle calls run on. Without one, the
    /// runtime current at the moment a job is admitted is used.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Sets the name of this manager instance for observability.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback for completed jobs.
    pub fn on_completed<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, JobEvent::Completed { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback for preemptions; receives whether the provider
    /// instance was kept for a resume.
    pub fn on_preempted<F>(mut self, f: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let JobEvent::Preempted { reuse, .. } = event {
                f(*reuse);
            }
        }));
        self
    }

    /// Registers a callback for jobs displaced from the admission queue.
    pub fn on_evicted<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, JobEvent::Evicted { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback for cancelled jobs.
    pub fn on_cancelled<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, JobEvent::Cancelled { .. }) {
                f();
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> JobConfig<K, V, E, Ev> {
        JobConfig {
            factory: self.factory,
            max_running: self.max_running,
            max_queued: self.max_queued,
            policy: self.policy,
            stop_grace: self.stop_grace,
            cache: self.cache,
            runtime: self.runtime,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}
