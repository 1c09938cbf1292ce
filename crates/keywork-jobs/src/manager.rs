//! The resumable job manager.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashMap;
use keywork_cache::{EntryOptions, Lookup, SharedCache};
use keywork_core::{Admitted, AdmissionQueue, EventListeners, TraceIdFactory};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

use crate::config::JobConfig;
use crate::error::JobError;
use crate::events::JobEvent;
use crate::provider::{JobContext, JobProvider, ProviderFactory, StopAction};
use crate::subscription::{JobSubscription, JobUpdate};

/// Progress events replayed to a subscriber that attaches mid-job.
const MAX_REPLAY: usize = 64;

type SubscriberSender<V, E, Ev> = mpsc::UnboundedSender<JobUpdate<V, E, Ev>>;

/// A provider instance kept across a stop/start cycle.
struct Retained<V, E, Ev> {
    provider: Box<dyn JobProvider<V, E, Ev>>,
    /// Identity of this instance; its context emissions stay valid across
    /// a preemption because the instance survives.
    instance: u64,
}

struct JobRecord<V, E, Ev> {
    subscribers: Vec<SubscriberSender<V, E, Ev>>,
    retained: Option<Retained<V, E, Ev>>,
    events: VecDeque<Ev>,
}

struct RunningJob<V, E, Ev> {
    subscribers: Vec<SubscriberSender<V, E, Ev>>,
    /// Present while mounted; taken out for the duration of start/stop
    /// calls, which run outside the manager lock.
    provider: Option<Box<dyn JobProvider<V, E, Ev>>>,
    /// Identity of the authorized provider instance. Emissions carrying any
    /// other id are from cancelled or abandoned instances and are dropped.
    instance: u64,
    priority: f64,
    events: VecDeque<Ev>,
    stopping: bool,
    cancelled: bool,
}

struct JobState<K, V, E, Ev> {
    queue: AdmissionQueue<K, JobRecord<V, E, Ev>>,
    running: HashMap<K, RunningJob<V, E, Ev>>,
}

struct JobShared<K, V, E, Ev> {
    state: Mutex<JobState<K, V, E, Ev>>,
    factory: ProviderFactory<K, V, E, Ev>,
    cache: Option<SharedCache<K, V>>,
    runtime: Option<Handle>,
    listeners: EventListeners<JobEvent>,
    trace: TraceIdFactory,
    name: String,
    max_running: usize,
    stop_grace: std::time::Duration,
}

/// Coordinates long-lived keyed jobs with progress events, bounded
/// concurrency and priority preemption.
///
/// Each key maps to one provider instance; any number of subscribers share
/// it and every one receives the provider's events in emission order,
/// followed by exactly one terminal result. When a higher-priority key
/// arrives at full capacity, the lowest-priority running provider is
/// stopped; an instance that answers [`StopAction::Reuse`] is requeued with
/// its state intact and resumes from where it stopped.
///
/// Cloning the manager is cheap and every clone shares the same state.
pub struct JobManager<K, V, E, Ev> {
    shared: Arc<JobShared<K, V, E, Ev>>,
}

impl<K, V, E, Ev> Clone for JobManager<K, V, E, Ev> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V, E, Ev> JobManager<K, V, E, Ev>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
    Ev: Clone + Send + 'static,
{
    /// Creates a job manager from a configuration.
    pub fn new(config: JobConfig<K, V, E, Ev>) -> Self {
        Self {
            shared: Arc::new(JobShared {
                state: Mutex::new(JobState {
                    queue: AdmissionQueue::new(config.max_queued, config.policy),
                    running: HashMap::new(),
                }),
                factory: config.factory,
                cache: config.cache.map(SharedCache::new),
                runtime: config.runtime,
                listeners: config.event_listeners,
                trace: TraceIdFactory::new(),
                name: config.name,
                max_running: config.max_running,
                stop_grace: config.stop_grace,
            }),
        }
    }

    /// Subscribes to `key` with default priority.
    pub fn fetch(&self, key: K) -> JobSubscription<V, E, Ev> {
        self.fetch_with(key, 0.0)
    }

    /// Subscribes to `key` with the given priority, admitting a job if none
    /// exists. A subscriber attaching to work already underway first
    /// receives a replay of recent progress events.
    ///
    /// # Panics
    ///
    /// Panics when no runtime was configured and none is current.
    pub fn fetch_with(&self, key: K, priority: f64) -> JobSubscription<V, E, Ev> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = JobSubscription { rx };

        {
            let mut state = self.shared.state.lock();
            if attach(&mut state, &key, &tx) {
                return subscription;
            }
        }

        // Cache lookups run outside the manager lock; the cache has user
        // listeners of its own.
        if let Some(cache) = &self.shared.cache {
            if let Lookup::Hit(value) = cache.get(&key) {
                let _ = tx.send(JobUpdate::Done(Ok(value)));
                return subscription;
            }
        }

        let mut events = Vec::new();
        let mut evicted = Vec::new();
        {
            let mut state = self.shared.state.lock();
            // Re-check: the key may have been admitted while the lock was
            // released for the cache lookup.
            if !attach(&mut state, &key, &tx) {
                let record = JobRecord {
                    subscribers: vec![tx],
                    retained: None,
                    events: VecDeque::new(),
                };
                match state.queue.push(key, record, priority) {
                    Admitted::Enqueued => {}
                    Admitted::Displaced { task, .. } | Admitted::Refused { task, .. } => {
                        evicted = task.subscribers;
                        events.push(JobEvent::Evicted {
                            name: self.shared.name.clone(),
                            timestamp: Instant::now(),
                        });
                    }
                }
                pump(&self.shared, &mut state, &mut events);
                maybe_preempt(&self.shared, &mut state);
            }
        }
        for tx in evicted {
            let _ = tx.send(JobUpdate::Done(Err(JobError::EvictedDueToPriority)));
        }
        emit_events(&self.shared, events);
        subscription
    }

    /// Cancels the job for `key`: a queued job is removed and its
    /// subscribers notified with [`JobError::Cancelled`]; a running provider
    /// is stopped under the grace window, after which subscribers receive
    /// [`JobError::Cancelled`] — or [`JobError::StopTimedOut`] when the
    /// provider had to be abandoned. Idempotent.
    pub fn cancel(&self, key: &K) {
        let mut events = Vec::new();
        let mut notify = Vec::new();
        let mut stop_now = None;
        {
            let mut state = self.shared.state.lock();
            if let Some((record, _priority)) = state.queue.remove(key) {
                notify = record.subscribers;
                events.push(JobEvent::Cancelled {
                    name: self.shared.name.clone(),
                    timestamp: Instant::now(),
                });
            } else if let Some(job) = state.running.get_mut(key) {
                if !job.cancelled {
                    job.cancelled = true;
                    if !job.stopping {
                        job.stopping = true;
                        // A provider that is out for a start call is handled
                        // by the starter once it observes the cancel flag.
                        stop_now = job.provider.take().map(|p| (p, job.instance));
                    }
                }
            }
        }
        for tx in notify {
            let _ = tx.send(JobUpdate::Done(Err(JobError::Cancelled)));
        }
        if let Some((provider, instance)) = stop_now {
            let runtime = self.runtime();
            runtime.spawn(stop_for_cancel(
                Arc::clone(&self.shared),
                key.clone(),
                provider,
                instance,
            ));
        }
        emit_events(&self.shared, events);
    }

    /// Number of keys with a running provider.
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

    fn runtime(&self) -> Handle {
        self.shared.runtime.clone().unwrap_or_else(Handle::current)
    }
}

/// Attaches `tx` to running or queued work for `key`, replaying buffered
/// progress first. Returns false when the key is unknown.
fn attach<K, V, E, Ev>(
    state: &mut JobState<K, V, E, Ev>,
    key: &K,
    tx: &SubscriberSender<V, E, Ev>,
) -> bool
where
    K: Hash + Eq + Clone,
    Ev: Clone,
{
    if let Some(job) = state.running.get_mut(key) {
        for event in &job.events {
            let _ = tx.send(JobUpdate::Event(event.clone()));
        }
        job.subscribers.push(tx.clone());
        return true;
    }
    if let Some(record) = state.queue.get_mut(key) {
        for event in &record.events {
            let _ = tx.send(JobUpdate::Event(event.clone()));
        }
        record.subscribers.push(tx.clone());
        return true;
    }
    false
}

/// Admits queued jobs while running slots are free. Called with the state
/// lock held; provider construction and `start` run on a spawned task.
fn pump<K, V, E, Ev>(
    shared: &Arc<JobShared<K, V, E, Ev>>,
    state: &mut JobState<K, V, E, Ev>,
    events: &mut Vec<JobEvent>,
) where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
    Ev: Clone + Send + 'static,
{
    while state.running.len() < shared.max_running && !state.queue.is_empty() {
        let runtime = shared.runtime.clone().unwrap_or_else(Handle::current);
        let (key, record, priority) = state.queue.pop_next().expect("queue is non-empty");
        let (provider, instance, resumed) = match record.retained {
            Some(retained) => (Some(retained.provider), retained.instance, true),
            None => (None, shared.trace.next(), false),
        };
        state.running.insert(
            key.clone(),
            RunningJob {
                subscribers: record.subscribers,
                provider: None,
                instance,
                priority,
                events: record.events,
                stopping: false,
                cancelled: false,
            },
        );
        events.push(JobEvent::Started {
            name: shared.name.clone(),
            timestamp: Instant::now(),
            resumed,
        });
        runtime.spawn(start_job(Arc::clone(shared), key, provider, instance));
    }
}

/// Stops the lowest-priority running provider when a queued job outranks
/// it. Called with the state lock held.
fn maybe_preempt<K, V, E, Ev>(shared: &Arc<JobShared<K, V, E, Ev>>, state: &mut JobState<K, V, E, Ev>)
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
    Ev: Clone + Send + 'static,
{
    if state.running.len() < shared.max_running {
        return;
    }
    let Some(next_priority) = state.queue.peek_priority() else {
        return;
    };
    let victim_key = state
        .running
        .iter()
        .filter(|(_, job)| !job.stopping && job.provider.is_some())
        .min_by(|a, b| a.1.priority.total_cmp(&b.1.priority))
        .map(|(key, _)| key.clone());
    let Some(victim_key) = victim_key else {
        return;
    };
    let job = state
        .running
        .get_mut(&victim_key)
        .expect("victim key was just selected");
    if next_priority <= job.priority {
        return;
    }
    job.stopping = true;
    let instance = job.instance;
    let provider = job.provider.take().expect("victim provider is mounted");

    #[cfg(feature = "tracing")]
    debug!(manager = %shared.name, "preempting lowest-priority job");

    let runtime = shared.runtime.clone().unwrap_or_else(Handle::current);
    runtime.spawn(stop_for_preempt(
        Arc::clone(shared),
        victim_key,
        provider,
        instance,
    ));
}

/// Constructs (or resumes) the provider for an admitted key and starts it.
async fn start_job<K, V, E, Ev>(
    shared: Arc<JobShared<K, V, E, Ev>>,
    key: K,
    provider: Option<Box<dyn JobProvider<V, E, Ev>>>,
    instance: u64,
) where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
    Ev: Clone + Send + 'static,
{
    let mut provider = match provider {
        Some(provider) => provider,
        None => {
            let ctx = make_context(&shared, &key, instance);
            (shared.factory)(&key, ctx)
        }
    };

    let started = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        provider.start();
        provider
    }));

    match started {
        Ok(provider) => {
            let cancelled = {
                let mut state = shared.state.lock();
                match state.running.get_mut(&key) {
                    Some(job) if job.instance == instance => {
                        if job.cancelled {
                            Some(provider)
                        } else {
                            job.provider = Some(provider);
                            None
                        }
                    }
                    // The job settled during start (a provider may complete
                    // synchronously); the instance is done, drop it.
                    _ => {
                        drop(provider);
                        None
                    }
                }
            };
            if let Some(provider) = cancelled {
                stop_for_cancel(shared, key, provider, instance).await;
            }
        }
        Err(_panic) => {
            // The instance was consumed by the unwind; fail the job.
            let mut events = Vec::new();
            let subscribers = {
                let mut state = shared.state.lock();
                let job = match state.running.get(&key) {
                    Some(job) if job.instance == instance => state.running.remove(&key),
                    _ => None,
                };
                let subs = job.map(|job| job.subscribers).unwrap_or_default();
                pump(&shared, &mut state, &mut events);
                subs
            };
            for tx in &subscribers {
                let _ = tx.send(JobUpdate::Done(Err(JobError::Panicked)));
            }
            events.push(JobEvent::Failed {
                name: shared.name.clone(),
                timestamp: Instant::now(),
            });
            emit_events(&shared, events);
        }
    }
}

fn make_context<K, V, E, Ev>(
    shared: &Arc<JobShared<K, V, E, Ev>>,
    key: &K,
    instance: u64,
) -> JobContext<V, E, Ev>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
    Ev: Clone + Send + 'static,
{
    let weak_events = Arc::downgrade(shared);
    let key_events = key.clone();
    let weak_result = Arc::downgrade(shared);
    let key_result = key.clone();
    JobContext {
        emit_event: Arc::new(move |event: Ev| {
            if let Some(shared) = weak_events.upgrade() {
                deliver_event(&shared, &key_events, instance, event);
            }
        }),
        complete: Arc::new(move |result: Result<V, E>| {
            if let Some(shared) = weak_result.upgrade() {
                deliver_result(&shared, &key_result, instance, result);
            }
        }),
    }
}

fn deliver_event<K, V, E, Ev>(shared: &Arc<JobShared<K, V, E, Ev>>, key: &K, instance: u64, event: Ev)
where
    K: Hash + Eq + Clone,
    Ev: Clone,
{
    let mut state = shared.state.lock();
    let Some(job) = state.running.get_mut(key) else {
        return;
    };
    if job.instance != instance {
        return;
    }
    if job.events.len() == MAX_REPLAY {
        job.events.pop_front();
    }
    job.events.push_back(event.clone());
    // A send fails only when the subscriber dropped its stream; prune it.
    job.subscribers
        .retain(|tx| tx.send(JobUpdate::Event(event.clone())).is_ok());
}

fn deliver_result<K, V, E, Ev>(
    shared: &Arc<JobShared<K, V, E, Ev>>,
    key: &K,
    instance: u64,
    result: Result<V, E>,
) where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
    Ev: Clone + Send + 'static,
{
    let mut events = Vec::new();
    let job = {
        let mut state = shared.state.lock();
        match state.running.get(key) {
            // A result racing a stop is dropped; the job is requeued or
            // cancelled and settles through that path.
            Some(job) if job.instance == instance && !job.stopping => {}
            _ => return,
        }
        let job = state
            .running
            .remove(key)
            .expect("running job was just observed");
        pump(shared, &mut state, &mut events);
        job
    };

    match result {
        Ok(value) => {
            if let Some(cache) = &shared.cache {
                let _ = cache.set_with(
                    key.clone(),
                    value.clone(),
                    EntryOptions::priority(job.priority),
                );
            }
            for tx in job.subscribers {
                let _ = tx.send(JobUpdate::Done(Ok(value.clone())));
            }
            events.push(JobEvent::Completed {
                name: shared.name.clone(),
                timestamp: Instant::now(),
            });
        }
        Err(error) => {
            for tx in job.subscribers {
                let _ = tx.send(JobUpdate::Done(Err(JobError::Provider(error.clone()))));
            }
            events.push(JobEvent::Failed {
                name: shared.name.clone(),
                timestamp: Instant::now(),
            });
        }
    }
    emit_events(shared, events);
}

/// Runs `stop` on a blocking thread under the grace window. A provider that
/// overruns the window is abandoned on that thread and treated as
/// [`StopAction::Dealloc`].
async fn run_stop<K, V, E, Ev>(
    shared: &Arc<JobShared<K, V, E, Ev>>,
    provider: Box<dyn JobProvider<V, E, Ev>>,
) -> (Option<Box<dyn JobProvider<V, E, Ev>>>, StopAction, bool)
where
    V: 'static,
    E: 'static,
    Ev: 'static,
{
    let runtime = shared.runtime.clone().unwrap_or_else(Handle::current);
    let join = runtime.spawn_blocking(move || {
        let mut provider = provider;
        let action = provider.stop();
        (provider, action)
    });
    match tokio::time::timeout(shared.stop_grace, join).await {
        Ok(Ok((provider, action))) => (Some(provider), action, false),
        Ok(Err(_join_error)) => (None, StopAction::Dealloc, false),
        Err(_elapsed) => (None, StopAction::Dealloc, true),
    }
}

async fn stop_for_cancel<K, V, E, Ev>(
    shared: Arc<JobShared<K, V, E, Ev>>,
    key: K,
    provider: Box<dyn JobProvider<V, E, Ev>>,
    instance: u64,
) where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
    Ev: Clone + Send + 'static,
{
    let (_provider, _action, timed_out) = run_stop(&shared, provider).await;
    let mut events = Vec::new();
    let job = {
        let mut state = shared.state.lock();
        let job = match state.running.get(&key) {
            Some(job) if job.instance == instance => state.running.remove(&key),
            _ => None,
        };
        if job.is_some() {
            pump(&shared, &mut state, &mut events);
        }
        job
    };
    let Some(job) = job else {
        emit_events(&shared, events);
        return;
    };
    let error = if timed_out {
        JobError::StopTimedOut
    } else {
        JobError::Cancelled
    };
    for tx in job.subscribers {
        let _ = tx.send(JobUpdate::Done(Err(error.clone())));
    }
    events.push(if timed_out {
        #[cfg(feature = "tracing")]
        warn!(manager = %shared.name, "provider ignored stop; abandoned");
        JobEvent::StopTimedOut {
            name: shared.name.clone(),
            timestamp: Instant::now(),
        }
    } else {
        JobEvent::Cancelled {
            name: shared.name.clone(),
            timestamp: Instant::now(),
        }
    });
    emit_events(&shared, events);
}

async fn stop_for_preempt<K, V, E, Ev>(
    shared: Arc<JobShared<K, V, E, Ev>>,
    key: K,
    provider: Box<dyn JobProvider<V, E, Ev>>,
    instance: u64,
) where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
    Ev: Clone + Send + 'static,
{
    let (provider_back, action, timed_out) = run_stop(&shared, provider).await;
    let mut events = Vec::new();
    let mut cancelled = Vec::new();
    let mut evicted = Vec::new();
    {
        let mut state = shared.state.lock();
        let job = match state.running.get(&key) {
            Some(job) if job.instance == instance => state.running.remove(&key),
            _ => None,
        };
        // The record can only be gone if a newer instance took the key over;
        // nothing is owed to anyone here.
        let Some(job) = job else {
            return;
        };
        if job.cancelled {
            cancelled = job.subscribers;
            events.push(JobEvent::Cancelled {
                name: shared.name.clone(),
                timestamp: Instant::now(),
            });
            pump(&shared, &mut state, &mut events);
        } else {
            let reuse = action == StopAction::Reuse && !timed_out && provider_back.is_some();
            if timed_out {
                events.push(JobEvent::StopTimedOut {
                    name: shared.name.clone(),
                    timestamp: Instant::now(),
                });
            }
            events.push(JobEvent::Preempted {
                name: shared.name.clone(),
                timestamp: Instant::now(),
                reuse,
            });
            // Free the slot and let the queue drain before the resume record
            // competes for queue space.
            pump(&shared, &mut state, &mut events);
            let record = JobRecord {
                subscribers: job.subscribers,
                retained: if reuse {
                    provider_back.map(|provider| Retained {
                        provider,
                        instance: job.instance,
                    })
                } else {
                    None
                },
                events: job.events,
            };
            match state.queue.push_front(key, record, job.priority) {
                Admitted::Enqueued => {}
                Admitted::Displaced { task, .. } | Admitted::Refused { task, .. } => {
                    evicted = task.subscribers;
                    events.push(JobEvent::Evicted {
                        name: shared.name.clone(),
                        timestamp: Instant::now(),
                    });
                }
            }
            pump(&shared, &mut state, &mut events);
        }
    }
    for tx in cancelled {
        let _ = tx.send(JobUpdate::Done(Err(JobError::Cancelled)));
    }
    for tx in evicted {
        let _ = tx.send(JobUpdate::Done(Err(JobError::EvictedDueToPriority)));
    }
    emit_events(&shared, events);
}

fn emit_events<K, V, E, Ev>(shared: &JobShared<K, V, E, Ev>, events: Vec<JobEvent>) {
    for event in &events {
        #[cfg(feature = "metrics")]
        {
            use keywork_core::CoordinationEvent;
            metrics::counter!(
                "keywork_jobs_events_total",
                "manager" => shared.name.clone(),
                "event" => event.event_type()
            )
            .increment(1);
        }

        shared.listeners.emit(event);
    }
}
