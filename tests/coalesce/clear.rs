//! Clear-mode semantics against in-flight executions.

use super::TestError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keywork_coalesce::{ClearMode, CoalesceError, Coalescer};

fn slow_counter(calls: Arc<AtomicUsize>) -> Coalescer<usize, TestError> {
    Coalescer::new(move || {
        let calls = Arc::clone(&calls);
        async move {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(call)
        }
    })
}

#[tokio::test]
async fn cancel_reaches_every_pending_waiter_exactly_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let coalescer = slow_counter(Arc::clone(&calls));

    let mut waiters = vec![];
    for _ in 0..5 {
        let coalescer = coalescer.clone();
        waiters.push(tokio::spawn(async move { coalescer.execute().await }));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    coalescer.clear(ClearMode::Cancel);
    // Idempotent: the second clear has nothing to cancel.
    coalescer.clear(ClearMode::Cancel);

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap().unwrap_err(), CoalesceError::Cancelled);
    }

    // The orphaned run's result must not appear later.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!coalescer.is_cached());
    assert!(!coalescer.is_running());
}

#[tokio::test]
async fn allow_completion_serves_current_waiters_without_caching() {
    let calls = Arc::new(AtomicUsize::new(0));
    let coalescer = slow_counter(Arc::clone(&calls));

    let waiter = {
        let coalescer = coalescer.clone();
        tokio::spawn(async move { coalescer.execute().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    coalescer.clear(ClearMode::AllowCompletion);

    assert_eq!(waiter.await.unwrap().unwrap(), 0);
    assert!(!coalescer.is_cached());

    // The next execute starts over.
    assert_eq!(coalescer.execute().await.unwrap(), 1);
}

#[tokio::test]
async fn restart_after_completion_feeds_the_next_generation_of_waiters() {
    let calls = Arc::new(AtomicUsize::new(0));
    let coalescer = slow_counter(Arc::clone(&calls));

    let first_a = {
        let coalescer = coalescer.clone();
        tokio::spawn(async move { coalescer.execute().await })
    };
    let first_b = {
        let coalescer = coalescer.clone();
        tokio::spawn(async move { coalescer.execute().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    coalescer.clear(ClearMode::RestartAfterCompletion);

    // Current waiters receive the in-flight execution's result.
    assert_eq!(first_a.await.unwrap().unwrap(), 0);
    assert_eq!(first_b.await.unwrap().unwrap(), 0);

    // The restarted execution is already running; a waiter attached now
    // receives its (distinct) result.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(coalescer.is_running());
    assert_eq!(coalescer.execute().await.unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn clearing_a_cached_value_forces_the_next_execute_to_produce() {
    let calls = Arc::new(AtomicUsize::new(0));
    let coalescer = slow_counter(Arc::clone(&calls));

    assert_eq!(coalescer.execute().await.unwrap(), 0);
    assert!(coalescer.is_cached());

    coalescer.clear(ClearMode::Cancel);
    assert!(!coalescer.is_cached());
    assert_eq!(coalescer.execute().await.unwrap(), 1);
}
