//! The keyed fetch dispatcher.

use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::FutureExt;
use hashbrown::HashMap;
use keywork_cache::{EntryOptions, Lookup, SharedCache};
use keywork_coalesce::RetryPolicy;
use keywork_core::{Admitted, AdmissionQueue, EventListeners};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::events::DispatchEvent;
use crate::provider::Provider;

type ResultSender<V, E> = oneshot::Sender<Result<V, DispatchError<E>>>;

/// Resolves to the terminal outcome of a dispatched fetch.
pub struct FetchHandle<V, E> {
    rx: oneshot::Receiver<Result<V, DispatchError<E>>>,
}

impl<V, E> Future for FetchHandle<V, E> {
    type Output = Result<V, DispatchError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(DispatchError::Lost)))
    }
}

struct QueuedFetch<V, E> {
    waiters: Vec<ResultSender<V, E>>,
}

struct RunningFetch<V, E> {
    waiters: Vec<ResultSender<V, E>>,
    priority: f64,
}

struct DispatchState<K, V, E> {
    queue: AdmissionQueue<K, QueuedFetch<V, E>>,
    running: HashMap<K, RunningFetch<V, E>>,
    /// Provider invocations in flight; one batch counts once.
    in_flight: usize,
}

struct DispatchShared<K, V, E> {
    state: Mutex<DispatchState<K, V, E>>,
    provider: Provider<K, V, E>,
    retry: RetryPolicy,
    cache: Option<SharedCache<K, V>>,
    runtime: Option<Handle>,
    listeners: EventListeners<DispatchEvent>,
    name: String,
    max_running: usize,
}

/// Coordinates many small keyed fetches: per-key coalescing, priority
/// admission with bounded running and queued sets, optional batching, and a
/// result cache.
///
/// A fetch resolves in this order: attach to the running execution for its
/// key, attach to the queued one, answer from the result cache, or admit a
/// new task. Admission overflow displaces the fetch minimizing
/// `(priority, policy order)` — possibly the incoming one — whose
/// subscribers see [`DispatchError::EvictedDueToPriority`].
///
/// Cloning the dispatcher is cheap and every clone shares the same state.
///
/// # Example
///
/// ```rust
/// use keywork_dispatch::{Dispatcher, DispatchConfig, Provider};
///
/// # #[derive(Debug, Clone)]
/// # struct DbError;
/// # async fn example() {
/// let provider = Provider::async_fn(|user_id: u64| async move {
///     Ok::<_, DbError>(format!("user-{user_id}"))
/// });
/// let dispatcher = Dispatcher::new(DispatchConfig::builder(provider).build());
///
/// // Concurrent fetches of the same key share one provider call.
/// let name = dispatcher.fetch(7).await.unwrap();
/// assert_eq!(name, "user-7");
/// # }
/// ```
pub struct Dispatcher<K, V, E> {
    shared: Arc<DispatchShared<K, V, E>>,
}

impl<K, V, E> Clone for Dispatcher<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V, E> Dispatcher<K, V, E>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a dispatcher from a configuration.
    pub fn new(config: DispatchConfig<K, V, E>) -> Self {
        Self {
            shared: Arc::new(DispatchShared {
                state: Mutex::new(DispatchState {
                    queue: AdmissionQueue::new(config.max_queued, config.policy),
                    running: HashMap::new(),
                    in_flight: 0,
                }),
                provider: config.provider,
                retry: config.retry,
                cache: config.cache.map(SharedCache::new),
                runtime: config.runtime,
                listeners: config.event_listeners,
                name: config.name,
                max_running: config.max_running,
            }),
        }
    }

    /// Fetches `key` with default priority.
    pub fn fetch(&self, key: K) -> FetchHandle<V, E> {
        self.fetch_with(key, 0.0)
    }

    /// Fetches `key` with the given priority. Higher priorities run first
    /// and survive admission pressure longer.
    ///
    /// # Panics
    ///
    /// Panics when no runtime was configured and none is current.
    pub fn fetch_with(&self, key: K, priority: f64) -> FetchHandle<V, E> {
        let (tx, rx) = oneshot::channel();
        self.submit_all(vec![(key, priority, tx)]);
        FetchHandle { rx }
    }

    /// Fetches every key with default priority. With a batch provider, keys
    /// that queue together are coalesced into provider invocations of up to
    /// `max_batch` in priority order.
    pub fn fetch_many(&self, keys: impl IntoIterator<Item = K>) -> Vec<FetchHandle<V, E>> {
        let mut handles = Vec::new();
        let mut entries = Vec::new();
        for key in keys {
            let (tx, rx) = oneshot::channel();
            handles.push(FetchHandle { rx });
            entries.push((key, 0.0, tx));
        }
        self.submit_all(entries);
        handles
    }

    /// Cancels interest in `key`: a queued fetch is removed and its
    /// subscribers receive [`DispatchError::Cancelled`]; a running fetch
    /// keeps executing (its result may still be cached) but current
    /// subscribers are detached with the same notification. Idempotent.
    pub fn cancel(&self, key: &K) {
        let mut cancelled = Vec::new();
        {
            let mut state = self.shared.state.lock();
            if let Some((task, _priority)) = state.queue.remove(key) {
                cancelled = task.waiters;
            } else if let Some(running) = state.running.get_mut(key) {
                cancelled = std::mem::take(&mut running.waiters);
            }
        }
        if cancelled.is_empty() {
            return;
        }
        for tx in cancelled {
            let _ = tx.send(Err(DispatchError::Cancelled));
        }
        emit_events(
            &self.shared,
            vec![DispatchEvent::Cancelled {
                name: self.shared.name.clone(),
                timestamp: Instant::now(),
            }],
        );
    }

    /// Number of keys currently executing.
    pub fn running_len(&self) -> usize {
        self.shared.state.lock().running.len()
    }

    /// Number of keys awaiting admission.
    pub fn queued_len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// The result cache, when one was configured.
    pub fn cache(&self) -> Option<SharedCache<K, V>> {
        self.shared.cache.clone()
    }

    fn submit_all(&self, entries: Vec<(K, f64, ResultSender<V, E>)>) {
        let mut events = Vec::new();

        // Attach to running or queued work first; only keys unknown to the
        // dispatcher consult the cache, so coalesced demand is not counted
        // as misses.
        let mut unattached = Vec::new();
        {
            let mut state = self.shared.state.lock();
            for (key, priority, tx) in entries {
                if let Some(tx) = attach(&mut state, &key, tx) {
                    unattached.push((key, priority, tx));
                }
            }
        }
        if unattached.is_empty() {
            return;
        }

        // Cache lookups run outside the dispatcher lock: the cache invokes
        // user-supplied listeners and validators of its own.
        let mut to_admit = Vec::new();
        for (key, priority, tx) in unattached {
            if let Some(cache) = &self.shared.cache {
                if let Lookup::Hit(value) = cache.get(&key) {
                    let _ = tx.send(Ok(value));
                    continue;
                }
            }
            to_admit.push((key, priority, tx));
        }
        if to_admit.is_empty() {
            return;
        }

        {
            let mut state = self.shared.state.lock();
            for (key, priority, tx) in to_admit {
                // Re-check: another thread may have admitted the key while
                // the lock was released for the cache lookup.
                let Some(tx) = attach(&mut state, &key, tx) else {
                    continue;
                };
                let admitted = state.queue.push(
                    key,
                    QueuedFetch { waiters: vec![tx] },
                    priority,
                );
                match admitted {
                    Admitted::Enqueued => {}
                    Admitted::Displaced { task, .. } | Admitted::Refused { task, .. } => {
                        for tx in task.waiters {
                            let _ = tx.send(Err(DispatchError::EvictedDueToPriority));
                        }
                        events.push(DispatchEvent::Evicted {
                            name: self.shared.name.clone(),
                            timestamp: Instant::now(),
                        });
                    }
                }
            }
            pump(&self.shared, &mut state, &mut events);
        }
        emit_events(&self.shared, events);
    }
}

/// Attaches `tx` to in-flight or queued work for `key`; hands it back when
/// the key is unknown.
fn attach<K, V, E>(
    state: &mut DispatchState<K, V, E>,
    key: &K,
    tx: ResultSender<V, E>,
) -> Option<ResultSender<V, E>>
where
    K: Hash + Eq + Clone,
{
    if let Some(running) = state.running.get_mut(key) {
        running.waiters.push(tx);
        return None;
    }
    if let Some(queued) = state.queue.get_mut(key) {
        queued.waiters.push(tx);
        return None;
    }
    Some(tx)
}

/// Admits queued work while running slots are free. Called with the state
/// lock held; spawning only enqueues onto the runtime.
fn pump<K, V, E>(
    shared: &Arc<DispatchShared<K, V, E>>,
    state: &mut DispatchState<K, V, E>,
    events: &mut Vec<DispatchEvent>,
) where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    while state.in_flight < shared.max_running && !state.queue.is_empty() {
        let runtime = shared.runtime.clone().unwrap_or_else(Handle::current);
        if shared.provider.is_batch() {
            let max_batch = shared.provider.max_batch();
            let mut keys = Vec::new();
            while keys.len() < max_batch {
                let Some((key, task, priority)) = state.queue.pop_next() else {
                    break;
                };
                state.running.insert(
                    key.clone(),
                    RunningFetch {
                        waiters: task.waiters,
                        priority,
                    },
                );
                keys.push(key);
            }
            state.in_flight += 1;
            events.push(DispatchEvent::BatchDispatched {
                name: shared.name.clone(),
                timestamp: Instant::now(),
                size: keys.len(),
            });
            runtime.spawn(run_batch(Arc::clone(shared), keys));
        } else {
            let (key, task, priority) = state.queue.pop_next().expect("queue is non-empty");
            state.running.insert(
                key.clone(),
                RunningFetch {
                    waiters: task.waiters,
                    priority,
                },
            );
            state.in_flight += 1;
            runtime.spawn(run_single(Arc::clone(shared), key));
        }
    }
}

async fn run_single<K, V, E>(shared: Arc<DispatchShared<K, V, E>>, key: K)
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let mut retries = 0usize;
    let outcome = loop {
        let attempt = match &shared.provider {
            Provider::Sync(f) => {
                let f = Arc::clone(f);
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&key)))
            }
            Provider::Async(f) => {
                std::panic::AssertUnwindSafe(f(key.clone()))
                    .catch_unwind()
                    .await
            }
            Provider::Batch { .. } => unreachable!("batch providers run through run_batch"),
        };
        match attempt {
            Ok(Ok(value)) => break Ok(value),
            Ok(Err(error)) => {
                if let Some(delay) = shared.retry.next_delay(retries) {
                    retries += 1;

                    #[cfg(feature = "tracing")]
                    debug!(dispatcher = %shared.name, retries, ?delay, "fetch failed, retrying");

                    tokio::time::sleep(delay).await;
                    continue;
                }
                break Err(if retries > 0 {
                    DispatchError::RetryExhausted(error)
                } else {
                    DispatchError::Provider(error)
                });
            }
            Err(_panic) => break Err(DispatchError::Panicked),
        }
    };
    finish_keys(&shared, vec![(key, outcome)]);
}

async fn run_batch<K, V, E>(shared: Arc<DispatchShared<K, V, E>>, keys: Vec<K>)
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let Provider::Batch { fetch, .. } = &shared.provider else {
        unreachable!("run_batch requires a batch provider");
    };
    let mut retries = 0usize;
    let outcome = loop {
        let attempt = std::panic::AssertUnwindSafe(fetch(keys.clone()))
            .catch_unwind()
            .await;
        match attempt {
            Ok(Ok(map)) => break Ok(map),
            Ok(Err(error)) => {
                if let Some(delay) = shared.retry.next_delay(retries) {
                    retries += 1;
                    tokio::time::sleep(delay).await;
                    continue;
                }
                break Err(if retries > 0 {
                    DispatchError::RetryExhausted(error)
                } else {
                    DispatchError::Provider(error)
                });
            }
            Err(_panic) => break Err(DispatchError::Panicked),
        }
    };
    let results = match outcome {
        Ok(mut map) => keys
            .into_iter()
            .map(|key| {
                let value = map.remove(&key).ok_or(DispatchError::MissingResult);
                (key, value)
            })
            .collect(),
        Err(error) => keys
            .into_iter()
            .map(|key| (key, Err(error.clone())))
            .collect(),
    };
    finish_keys(&shared, results);
}

/// Settles one provider invocation: frees the run slot, admits successors,
/// then (outside the lock) stores values in the cache and fans out results.
/// Subscribers beyond the first are served through the cache so its
/// statistics account for the coalesced demand.
fn finish_keys<K, V, E>(
    shared: &Arc<DispatchShared<K, V, E>>,
    results: Vec<(K, Result<V, DispatchError<E>>)>,
) where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let mut events = Vec::new();
    let mut deliveries = Vec::new();
    {
        let mut state = shared.state.lock();
        state.in_flight -= 1;
        for (key, outcome) in results {
            let record = state
                .running
                .remove(&key)
                .expect("completed fetch is tracked as running");
            deliveries.push((key, record, outcome));
        }
        pump(shared, &mut state, &mut events);
    }

    for (key, record, outcome) in deliveries {
        match outcome {
            Ok(value) => {
                let mut cached = false;
                if let Some(cache) = &shared.cache {
                    cached = cache
                        .set_with(
                            key.clone(),
                            value.clone(),
                            EntryOptions::priority(record.priority),
                        )
                        .is_ok();
                }
                let mut waiters = record.waiters.into_iter();
                if let Some(leader) = waiters.next() {
                    let _ = leader.send(Ok(value.clone()));
                }
                for tx in waiters {
                    let served = if cached {
                        shared.cache.as_ref().and_then(|cache| {
                            match cache.get(&key) {
                                Lookup::Hit(v) => Some(v),
                                _ => None,
                            }
                        })
                    } else {
                        None
                    };
                    let _ = tx.send(Ok(served.unwrap_or_else(|| value.clone())));
                }
                events.push(DispatchEvent::Completed {
                    name: shared.name.clone(),
                    timestamp: Instant::now(),
                });
            }
            Err(error) => {
                for tx in record.waiters {
                    let _ = tx.send(Err(error.clone()));
                }
                events.push(DispatchEvent::Failed {
                    name: shared.name.clone(),
                    timestamp: Instant::now(),
                });
            }
        }
    }
    emit_events(shared, events);
}

fn emit_events<K, V, E>(shared: &DispatchShared<K, V, E>, events: Vec<DispatchEvent>) {
    for event in &events {
        #[cfg(feature = "metrics")]
        {
            use keywork_core::CoordinationEvent;
            metrics::counter!(
                "keywork_dispatch_events_total",
                "dispatcher" => shared.name.clone(),
                "event" => event.event_type()
            )
            .increment(1);
        }

        shared.listeners.emit(event);
    }
}
