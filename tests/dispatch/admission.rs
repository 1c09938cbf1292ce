//! Priority admission, tie policies and queue displacement.

use super::TestError;
use std::sync::Arc;
use std::time::Duration;

use keywork_dispatch::{AdmissionPolicy, DispatchConfig, DispatchError, Dispatcher, Provider};
use parking_lot::Mutex;

/// A dispatcher with one run slot whose provider records execution order.
fn recording_dispatcher(
    policy: AdmissionPolicy,
    max_queued: usize,
) -> (Dispatcher<String, String, TestError>, Arc<Mutex<Vec<String>>>) {
    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let order_clone = Arc::clone(&order);
    let provider = Provider::async_fn(move |key: String| {
        let order = Arc::clone(&order_clone);
        async move {
            order.lock().push(key.clone());
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(key)
        }
    });
    let dispatcher = Dispatcher::new(
        DispatchConfig::builder(provider)
            .max_running(1)
            .max_queued(max_queued)
            .policy(policy)
            .build(),
    );
    (dispatcher, order)
}

#[tokio::test]
async fn highest_priority_runs_first() {
    let (dispatcher, order) = recording_dispatcher(AdmissionPolicy::Fifo, 16);

    let blocker = dispatcher.fetch("blocker".to_string());
    tokio::time::sleep(Duration::from_millis(5)).await;

    let low = dispatcher.fetch_with("low".to_string(), 1.0);
    let high = dispatcher.fetch_with("high".to_string(), 5.0);
    let mid = dispatcher.fetch_with("mid".to_string(), 3.0);

    blocker.await.unwrap();
    low.await.unwrap();
    high.await.unwrap();
    mid.await.unwrap();

    assert_eq!(*order.lock(), vec!["blocker", "high", "mid", "low"]);
}

#[tokio::test]
async fn fifo_breaks_ties_by_submission_order() {
    let (dispatcher, order) = recording_dispatcher(AdmissionPolicy::Fifo, 16);

    let blocker = dispatcher.fetch("blocker".to_string());
    tokio::time::sleep(Duration::from_millis(5)).await;

    let handles = vec![
        dispatcher.fetch("first".to_string()),
        dispatcher.fetch("second".to_string()),
        dispatcher.fetch("third".to_string()),
    ];
    blocker.await.unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*order.lock(), vec!["blocker", "first", "second", "third"]);
}

#[tokio::test]
async fn lifo_breaks_ties_by_recency() {
    let (dispatcher, order) = recording_dispatcher(AdmissionPolicy::Lifo, 16);

    let blocker = dispatcher.fetch("blocker".to_string());
    tokio::time::sleep(Duration::from_millis(5)).await;

    let handles = vec![
        dispatcher.fetch("first".to_string()),
        dispatcher.fetch("second".to_string()),
        dispatcher.fetch("third".to_string()),
    ];
    blocker.await.unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*order.lock(), vec!["blocker", "third", "second", "first"]);
}

#[tokio::test]
async fn fifo_overflow_displaces_the_oldest_queued_fetch() {
    let (dispatcher, _order) = recording_dispatcher(AdmissionPolicy::Fifo, 1);

    let blocker = dispatcher.fetch("blocker".to_string());
    tokio::time::sleep(Duration::from_millis(5)).await;

    let old = dispatcher.fetch("old".to_string());
    let new = dispatcher.fetch("new".to_string());

    assert_eq!(old.await.unwrap_err(), DispatchError::EvictedDueToPriority);
    blocker.await.unwrap();
    assert_eq!(new.await.unwrap(), "new");
}

#[tokio::test]
async fn lifo_overflow_refuses_the_incoming_fetch() {
    let (dispatcher, _order) = recording_dispatcher(AdmissionPolicy::Lifo, 1);

    let blocker = dispatcher.fetch("blocker".to_string());
    tokio::time::sleep(Duration::from_millis(5)).await;

    let old = dispatcher.fetch("old".to_string());
    let new = dispatcher.fetch("new".to_string());

    assert_eq!(new.await.unwrap_err(), DispatchError::EvictedDueToPriority);
    blocker.await.unwrap();
    assert_eq!(old.await.unwrap(), "old");
}

#[tokio::test]
async fn weaker_priority_never_displaces_stronger() {
    let (dispatcher, _order) = recording_dispatcher(AdmissionPolicy::Fifo, 1);

    let blocker = dispatcher.fetch("blocker".to_string());
    tokio::time::sleep(Duration::from_millis(5)).await;

    let strong = dispatcher.fetch_with("strong".to_string(), 5.0);
    let weak = dispatcher.fetch_with("weak".to_string(), 1.0);

    assert_eq!(weak.await.unwrap_err(), DispatchError::EvictedDueToPriority);
    blocker.await.unwrap();
    assert_eq!(strong.await.unwrap(), "strong");
}

#[tokio::test]
async fn eviction_listener_observes_displacements() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let evictions = Arc::new(AtomicUsize::new(0));
    let evictions_clone = Arc::clone(&evictions);
    let provider = Provider::async_fn(|key: String| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, TestError>(key)
    });
    let dispatcher = Dispatcher::new(
        DispatchConfig::builder(provider)
            .max_running(1)
            .max_queued(1)
            .on_evicted(move || {
                evictions_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
    );

    let _blocker = dispatcher.fetch("blocker".to_string());
    tokio::time::sleep(Duration::from_millis(5)).await;
    let old = dispatcher.fetch("old".to_string());
    let _new = dispatcher.fetch("new".to_string());

    let _ = old.await;
    assert_eq!(evictions.load(Ordering::SeqCst), 1);
}
