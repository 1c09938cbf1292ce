//! Single-flight execution with result caching and retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::CoalesceConfig;
use crate::error::CoalesceError;

/// How [`Coalescer::clear`] treats an in-flight execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMode {
    /// Waiters are notified with [`CoalesceError::Cancelled`]; a result from
    /// the orphaned execution is discarded.
    Cancel,
    /// The in-flight execution runs to completion and its result reaches the
    /// current waiters, but nothing is cached.
    AllowCompletion,
    /// After the in-flight execution completes (success or failure), a fresh
    /// execution starts automatically.
    RestartAfterCompletion,
}

type Producer<V, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, E>> + Send + Sync>;
type Waiter<V, E> = oneshot::Sender<Result<V, CoalesceError<E>>>;

/// A requested execution: either answered from cache or pending.
pub enum Execution<V, E> {
    /// A fresh cached value answered the request immediately.
    Ready(V),
    /// The request joined an execution; the receiver resolves exactly once.
    Pending(oneshot::Receiver<Result<V, CoalesceError<E>>>),
}

impl<V, E> Execution<V, E> {
    /// Resolves the execution to its terminal outcome.
    pub async fn outcome(self) -> Result<V, CoalesceError<E>> {
        match self {
            Execution::Ready(value) => Ok(value),
            Execution::Pending(rx) => rx.await.unwrap_or(Err(CoalesceError::Lost)),
        }
    }
}

enum OnComplete {
    Cache,
    Discard,
    Restart,
}

struct Run<V, E> {
    waiters: Vec<Waiter<V, E>>,
    on_complete: OnComplete,
}

enum State<V, E> {
    Idle,
    Running(Run<V, E>),
    Cached {
        value: V,
        expires_at: Option<Instant>,
    },
}

struct Cell<V, E> {
    /// Bumped on every new run and on cancellation; a driver whose epoch no
    /// longer matches is orphaned and its result is dropped.
    epoch: u64,
    state: State<V, E>,
}

struct Shared<V, E> {
    cell: Mutex<Cell<V, E>>,
    producer: Producer<V, E>,
    config: CoalesceConfig,
}

/// A single-flight guard around one async computation.
///
/// Concurrent demand shares one producer invocation; every waiter receives a
/// clone of the same outcome. A successful result is cached for the
/// configured freshness window, failures consult the retry policy, and
/// [`clear`](Self::clear) defines exact semantics for an in-flight run.
///
/// Cloning the coalescer is cheap and every clone shares the same state.
///
/// # Example
///
/// ```rust
/// use keywork_coalesce::Coalescer;
///
/// # #[derive(Debug, Clone)]
/// # struct LoadError;
/// # async fn example() {
/// let coalescer: Coalescer<String, LoadError> = Coalescer::new(|| async {
///     // one expensive load, no matter how many callers want it
///     Ok("profile".to_string())
/// });
///
/// let value = coalescer.execute().await.unwrap();
/// assert_eq!(value, "profile");
/// # }
/// ```
pub struct Coalescer<V, E> {
    shared: Arc<Shared<V, E>>,
}

impl<V, E> Clone for Coalescer<V, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V, E> Coalescer<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a coalescer with the default configuration.
    pub fn new<F, Fut>(produce: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        Self::with_config(produce, CoalesceConfig::default())
    }

    /// Creates a coalescer with the given configuration.
    pub fn with_config<F, Fut>(produce: F, config: CoalesceConfig) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                cell: Mutex::new(Cell {
                    epoch: 0,
                    state: State::Idle,
                }),
                producer: Arc::new(move || produce().boxed()),
                config,
            }),
        }
    }

    /// Requests the value, deduplicating against any in-flight execution.
    ///
    /// A fresh cached value resolves immediately without invoking the
    /// producer. Otherwise the caller joins the running execution, or starts
    /// one when idle.
    pub async fn execute(&self) -> Result<V, CoalesceError<E>> {
        self.request(false).outcome().await
    }

    /// Requests a fresh value, bypassing the cached result. An in-flight
    /// execution is joined rather than duplicated.
    pub async fn execute_fresh(&self) -> Result<V, CoalesceError<E>> {
        self.request(true).outcome().await
    }

    /// Blocking variant of [`execute`](Self::execute) for callers outside
    /// the async runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async context, and when no runtime
    /// was configured and none is current.
    pub fn execute_blocking(&self) -> Result<V, CoalesceError<E>> {
        match self.request(false) {
            Execution::Ready(value) => Ok(value),
            Execution::Pending(rx) => rx.blocking_recv().unwrap_or(Err(CoalesceError::Lost)),
        }
    }

    /// Low-level entry point: joins or starts an execution and hands back
    /// either the cached value or a pending receiver. Useful for
    /// callback-style call sites that dispatch the receiver themselves.
    pub fn request(&self, force_refresh: bool) -> Execution<V, E> {
        let mut cell = self.shared.cell.lock();
        if let State::Cached { value, expires_at } = &cell.state {
            let fresh = expires_at.map_or(true, |at| at > Instant::now());
            if fresh && !force_refresh {
                #[cfg(feature = "metrics")]
                counter!("keywork_coalesce_requests_total", "coalesce" => self.shared.config.name.clone(), "role" => "cached")
                    .increment(1);
                return Execution::Ready(value.clone());
            }
            cell.state = State::Idle;
        }
        match &mut cell.state {
            State::Running(run) => {
                let (tx, rx) = oneshot::channel();
                run.waiters.push(tx);

                #[cfg(feature = "metrics")]
                counter!("keywork_coalesce_requests_total", "coalesce" => self.shared.config.name.clone(), "role" => "waiter")
                    .increment(1);

                #[cfg(feature = "tracing")]
                debug!(coalesce = %self.shared.config.name, "request joined in-flight execution");

                Execution::Pending(rx)
            }
            State::Idle => {
                let (tx, rx) = oneshot::channel();
                start_run(&self.shared, &mut cell, vec![tx]);

                #[cfg(feature = "metrics")]
                counter!("keywork_coalesce_requests_total", "coalesce" => self.shared.config.name.clone(), "role" => "leader")
                    .increment(1);

                #[cfg(feature = "tracing")]
                debug!(coalesce = %self.shared.config.name, "request started execution");

                Execution::Pending(rx)
            }
            State::Cached { .. } => unreachable!("stale cached state was reset above"),
        }
    }

    /// Starts an execution if none is running and no fresh value is cached.
    /// No waiter is registered; the outcome lands in the cache (or consults
    /// the retry policy) as usual.
    pub fn spawn_refresh(&self) {
        let mut cell = self.shared.cell.lock();
        let fresh = match &cell.state {
            State::Running(_) => return,
            State::Cached { expires_at, .. } => expires_at.map_or(true, |at| at > Instant::now()),
            State::Idle => false,
        };
        if fresh {
            return;
        }
        cell.state = State::Idle;
        start_run(&self.shared, &mut cell, Vec::new());
    }

    /// Erases the cached value and applies `mode` to any in-flight
    /// execution. Idempotent: repeated calls on a settled coalescer are
    /// no-ops, and a cancellation notifies each pending waiter exactly once.
    pub fn clear(&self, mode: ClearMode) {
        let mut cell = self.shared.cell.lock();
        match cell.state {
            State::Idle => {}
            State::Cached { .. } => cell.state = State::Idle,
            State::Running(_) => match mode {
                ClearMode::Cancel => {
                    cell.epoch += 1;
                    let State::Running(run) = std::mem::replace(&mut cell.state, State::Idle)
                    else {
                        unreachable!("state was just observed running");
                    };
                    for tx in run.waiters {
                        let _ = tx.send(Err(CoalesceError::Cancelled));
                    }

                    #[cfg(feature = "tracing")]
                    debug!(coalesce = %self.shared.config.name, "in-flight execution cancelled");
                }
                ClearMode::AllowCompletion => {
                    if let State::Running(run) = &mut cell.state {
                        run.on_complete = OnComplete::Discard;
                    }
                }
                ClearMode::RestartAfterCompletion => {
                    if let State::Running(run) = &mut cell.state {
                        run.on_complete = OnComplete::Restart;
                    }
                }
            },
        }
    }

    /// True while an execution is in flight.
    pub fn is_running(&self) -> bool {
        matches!(self.shared.cell.lock().state, State::Running(_))
    }

    /// True while a fresh result is cached.
    pub fn is_cached(&self) -> bool {
        self.cached_value().is_some()
    }

    /// The cached value, when fresh.
    pub fn cached_value(&self) -> Option<V> {
        let cell = self.shared.cell.lock();
        match &cell.state {
            State::Cached { value, expires_at }
                if expires_at.map_or(true, |at| at > Instant::now()) =>
            {
                Some(value.clone())
            }
            _ => None,
        }
    }
}

fn start_run<V, E>(shared: &Arc<Shared<V, E>>, cell: &mut Cell<V, E>, waiters: Vec<Waiter<V, E>>)
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    cell.epoch += 1;
    let epoch = cell.epoch;
    cell.state = State::Running(Run {
        waiters,
        on_complete: OnComplete::Cache,
    });
    let runtime = shared
        .config
        .runtime
        .clone()
        .unwrap_or_else(Handle::current);
    runtime.spawn(drive(Arc::clone(shared), epoch));
}

/// One execution: invokes the producer, retrying per policy, then settles
/// the shared state. The epoch check at every decision point drops work
/// orphaned by cancellation.
async fn drive<V, E>(shared: Arc<Shared<V, E>>, epoch: u64)
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let mut retries = 0usize;
    loop {
        let attempt = std::panic::AssertUnwindSafe((shared.producer)())
            .catch_unwind()
            .await;
        match attempt {
            Ok(Ok(value)) => {
                settle(&shared, epoch, Ok(value));
                return;
            }
            Ok(Err(error)) => {
                if let Some(delay) = shared.config.retry.next_delay(retries) {
                    retries += 1;

                    #[cfg(feature = "metrics")]
                    counter!("keywork_coalesce_retries_total", "coalesce" => shared.config.name.clone())
                        .increment(1);

                    #[cfg(feature = "tracing")]
                    debug!(coalesce = %shared.config.name, retries, ?delay, "producer failed, retrying");

                    tokio::time::sleep(delay).await;
                    if shared.cell.lock().epoch != epoch {
                        return;
                    }
                    continue;
                }
                let error = if retries > 0 {
                    CoalesceError::RetryExhausted(error)
                } else {
                    CoalesceError::Producer(error)
                };
                settle(&shared, epoch, Err(error));
                return;
            }
            Err(_panic) => {
                settle(&shared, epoch, Err(CoalesceError::Panicked));
                return;
            }
        }
    }
}

fn settle<V, E>(shared: &Arc<Shared<V, E>>, epoch: u64, result: Result<V, CoalesceError<E>>)
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let mut cell = shared.cell.lock();
    if cell.epoch != epoch {
        // Orphaned by clear(Cancel); late results are dropped.
        return;
    }
    let State::Running(run) = std::mem::replace(&mut cell.state, State::Idle) else {
        unreachable!("current epoch implies a running state");
    };
    for tx in run.waiters {
        let _ = tx.send(result.clone());
    }
    match run.on_complete {
        OnComplete::Restart => start_run(shared, &mut cell, Vec::new()),
        OnComplete::Cache => {
            if let Ok(value) = result {
                match shared.config.result_ttl {
                    Some(ttl) if ttl.is_zero() => {}
                    Some(ttl) => {
                        cell.state = State::Cached {
                            value,
                            expires_at: Some(Instant::now() + ttl),
                        }
                    }
                    None => {
                        cell.state = State::Cached {
                            value,
                            expires_at: None,
                        }
                    }
                }
            }
        }
        OnComplete::Discard => {}
    }
}
