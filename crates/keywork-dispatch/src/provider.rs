//! Upstream providers for dispatched fetches.

use std::sync::Arc;

use futures::future::BoxFuture;
use hashbrown::HashMap;

/// The upstream a [`Dispatcher`](crate::Dispatcher) fetches from.
///
/// Three shapes cover the usual integrations: a synchronous function, an
/// async function, and a batched async function that resolves many keys in
/// one upstream round trip.
pub enum Provider<K, V, E> {
    /// Synchronous single-key fetch, invoked on the dispatcher's runtime.
    Sync(Arc<dyn Fn(&K) -> Result<V, E> + Send + Sync>),
    /// Async single-key fetch.
    Async(Arc<dyn Fn(K) -> BoxFuture<'static, Result<V, E>> + Send + Sync>),
    /// Async batched fetch: up to `max_batch` queued keys are collected in
    /// priority order and resolved by one invocation returning a key→value
    /// map. Keys missing from the map fail with
    /// [`DispatchError::MissingResult`](crate::DispatchError::MissingResult).
    Batch {
        /// Largest number of keys handed to one invocation.
        max_batch: usize,
        /// The batched fetch itself.
        #[allow(clippy::type_complexity)]
        fetch: Arc<dyn Fn(Vec<K>) -> BoxFuture<'static, Result<HashMap<K, V>, E>> + Send + Sync>,
    },
}

impl<K, V, E> Provider<K, V, E> {
    /// A synchronous single-key provider.
    pub fn sync_fn<F>(f: F) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    {
        Provider::Sync(Arc::new(f))
    }

    /// An async single-key provider.
    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<V, E>> + Send + 'static,
    {
        use futures::FutureExt;
        Provider::Async(Arc::new(move |key| f(key).boxed()))
    }

    /// A batched provider resolving up to `max_batch` keys per invocation.
    pub fn batch<F, Fut>(max_batch: usize, f: F) -> Self
    where
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<HashMap<K, V>, E>> + Send + 'static,
    {
        use futures::FutureExt;
        Provider::Batch {
            max_batch: max_batch.max(1),
            fetch: Arc::new(move |keys| f(keys).boxed()),
        }
    }

    pub(crate) fn is_batch(&self) -> bool {
        matches!(self, Provider::Batch { .. })
    }

    pub(crate) fn max_batch(&self) -> usize {
        match self {
            Provider::Batch { max_batch, .. } => *max_batch,
            _ => 1,
        }
    }
}

impl<K, V, E> Clone for Provider<K, V, E> {
    fn clone(&self) -> Self {
        match self {
            Provider::Sync(f) => Provider::Sync(Arc::clone(f)),
            Provider::Async(f) => Provider::Async(Arc::clone(f)),
            Provider::Batch { max_batch, fetch } => Provider::Batch {
                max_batch: *max_batch,
                fetch: Arc::clone(fetch),
            },
        }
    }
}
