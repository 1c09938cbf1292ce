//! Configuration for the dispatcher.

use keywork_cache::CacheConfig;
use keywork_coalesce::RetryPolicy;
use keywork_core::{AdmissionPolicy, EventListeners, FnListener};
use tokio::runtime::Handle;

use crate::events::DispatchEvent;
use crate::provider::Provider;

/// Configuration for [`Dispatcher`](crate::Dispatcher).
pub struct DispatchConfig<K, V, E> {
    pub(crate) provider: Provider<K, V, E>,
    pub(crate) max_running: usize,
    pub(crate) max_queued: usize,
    pub(crate) policy: AdmissionPolicy,
    pub(crate) retry: RetryPolicy,
    pub(crate) cache: Option<CacheConfig<K, V>>,
    pub(crate) runtime: Option<Handle>,
    pub(crate) event_listeners: EventListeners<DispatchEvent>,
    pub(crate) name: String,
}

impl<K, V, E> DispatchConfig<K, V, E> {
    /// Creates a builder around the given provider.
    pub fn builder(provider: Provider<K, V, E>) -> DispatchConfigBuilder<K, V, E> {
        DispatchConfigBuilder::new(provider)
    }
}

/// Builder for [`DispatchConfig`].
pub struct DispatchConfigBuilder<K, V, E> {
    provider: Provider<K, V, E>,
    max_running: usize,
    max_queued: usize,
    policy: AdmissionPolicy,
    retry: RetryPolicy,
    cache: Option<CacheConfig<K, V>>,
    runtime: Option<Handle>,
    event_listeners: EventListeners<DispatchEvent>,
    name: String,
}

impl<K, V, E> DispatchConfigBuilder<K, V, E> {
    /// Creates a new builder with default values.
    pub fn new(provider: Provider<K, V, E>) -> Self {
        Self {
            provider,
            max_running: 4,
            max_queued: 256,
            policy: AdmissionPolicy::Fifo,
            retry: RetryPolicy::Never,
            cache: None,
            runtime: None,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the number of provider invocations allowed in flight at once.
    ///
    /// Default: 4
    pub fn max_running(mut self, max: usize) -> Self {
        self.max_running = max.max(1);
        self
    }

    /// Sets the admission-queue capacity. When the queue is full, the
    /// displacement victim is the queued fetch minimizing
    /// `(priority, policy order)` — possibly the incoming fetch itself.
    ///
    /// Default: 256
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

    /// Sets the per-fetch retry policy.
    ///
    /// Default: no retries
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enables a result cache with the given configuration. Completed values
    /// land in the cache and coalesced subscribers are served through it, so
    /// its statistics reflect deduplicated demand.
    ///
    /// Default: no result cache
    pub fn result_cache(mut self, cache: CacheConfig<K, V>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the runtime providers run on. Without one, the runtime current
    /// at the moment a fetch is admitted is used.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Sets the name of this dispatcher instance for observability.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback for successfully completed fetches.
    pub fn on_completed<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, DispatchEvent::Completed { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback for fetches displaced from the admission queue.
    pub fn on_evicted<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, DispatchEvent::Evicted { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback for cancelled fetches.
    pub fn on_cancelled<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, DispatchEvent::Cancelled { .. }) {
                f();
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> DispatchConfig<K, V, E> {
        DispatchConfig {
            provider: self.provider,
            max_running: self.max_running,
            max_queued: self.max_queued,
            policy: self.policy,
            retry: self.retry,
            cache: self.cache,
            runtime: self.runtime,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}
