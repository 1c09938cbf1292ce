//! Configuration for the coalescer.

use std::time::Duration;

use tokio::runtime::Handle;

use crate::backoff::RetryPolicy;

/// Configuration for [`Coalescer`](crate::Coalescer).
#[derive(Clone)]
pub struct CoalesceConfig {
    pub(crate) retry: RetryPolicy,
    pub(crate) result_ttl: Option<Duration>,
    pub(crate) runtime: Option<Handle>,
    pub(crate) name: String,
}

impl CoalesceConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CoalesceConfigBuilder {
        CoalesceConfigBuilder::new()
    }
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        CoalesceConfigBuilder::new().build()
    }
}

/// Builder for [`CoalesceConfig`].
pub struct CoalesceConfigBuilder {
    retry: RetryPolicy,
    result_ttl: Option<Duration>,
    runtime: Option<Handle>,
    name: String,
}

impl CoalesceConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            retry: RetryPolicy::Never,
            result_ttl: None,
            runtime: None,
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the retry policy consulted when the producer fails.
    ///
    /// Default: no retries
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets how long a successful result stays fresh. `Duration::ZERO`
    /// disables result caching entirely.
    ///
    /// Default: results stay fresh forever
    pub fn result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = Some(ttl);
        self
    }

    /// Sets the runtime the producer runs on. Without one, the runtime
    /// current at the moment an execution starts is used.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Sets the name of this coalescer instance for observability.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CoalesceConfig {
        CoalesceConfig {
            retry: self.retry,
            result_ttl: self.result_ttl,
            runtime: self.runtime,
            name: self.name,
        }
    }
}

impl Default for CoalesceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
