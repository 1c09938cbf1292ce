//! Batched providers and batch coalescing.

use super::TestError;
use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use keywork_dispatch::{DispatchConfig, DispatchError, Dispatcher, Provider};
use parking_lot::Mutex;

/// A batch provider that records the key-set of every invocation.
fn batching_dispatcher(
    max_batch: usize,
) -> (Dispatcher<u32, u32, TestError>, Arc<Mutex<Vec<Vec<u32>>>>) {
    let batches: Arc<Mutex<Vec<Vec<u32>>>> = Arc::new(Mutex::new(Vec::new()));
    let batches_clone = Arc::clone(&batches);
    let provider = Provider::batch(max_batch, move |keys: Vec<u32>| {
        let batches = Arc::clone(&batches_clone);
        async move {
            batches.lock().push(keys.clone());
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(keys.into_iter().map(|k| (k, k * 10)).collect::<HashMap<_, _>>())
        }
    });
    let dispatcher = Dispatcher::new(
        DispatchConfig::builder(provider).max_running(1).build(),
    );
    (dispatcher, batches)
}

#[tokio::test]
async fn queued_keys_coalesce_into_bounded_batches() {
    let (dispatcher, batches) = batching_dispatcher(3);

    let handles = dispatcher.fetch_many(0..6);
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), i as u32 * 10);
    }

    let seen = batches.lock();
    assert!(seen.iter().all(|batch| batch.len() <= 3));
    let total: usize = seen.iter().map(|batch| batch.len()).sum();
    assert_eq!(total, 6);
}

#[tokio::test]
async fn batches_drain_in_priority_order() {
    let (dispatcher, batches) = batching_dispatcher(2);

    // Occupy the slot so priorities can accumulate in the queue.
    let blocker = dispatcher.fetch(99);
    tokio::time::sleep(Duration::from_millis(5)).await;

    let low = dispatcher.fetch_with(1, 1.0);
    let high = dispatcher.fetch_with(2, 9.0);
    let mid = dispatcher.fetch_with(3, 5.0);

    blocker.await.unwrap();
    low.await.unwrap();
    high.await.unwrap();
    mid.await.unwrap();

    let seen = batches.lock();
    // First batch after the blocker holds the two strongest keys.
    assert_eq!(seen[1], vec![2, 3]);
    assert_eq!(seen[2], vec![1]);
}

#[tokio::test]
async fn keys_missing_from_the_batch_result_fail_individually() {
    let provider = Provider::batch(4, |keys: Vec<u32>| async move {
        // Resolve everything except key 2.
        Ok::<_, TestError>(
            keys.into_iter()
                .filter(|k| *k != 2)
                .map(|k| (k, k))
                .collect::<HashMap<_, _>>(),
        )
    });
    let dispatcher = Dispatcher::new(DispatchConfig::builder(provider).build());

    let handles = dispatcher.fetch_many(0..4);
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await);
    }
    assert_eq!(results[0], Ok(0));
    assert_eq!(results[1], Ok(1));
    assert_eq!(results[2], Err(DispatchError::MissingResult));
    assert_eq!(results[3], Ok(3));
}

#[tokio::test]
async fn batch_failure_reaches_every_key() {
    let provider = Provider::batch(8, |_keys: Vec<u32>| async move {
        Err::<HashMap<u32, u32>, _>(TestError::new("upstream down"))
    });
    let dispatcher = Dispatcher::new(DispatchConfig::builder(provider).build());

    let handles = dispatcher.fetch_many(0..3);
    for handle in handles {
        assert_eq!(
            handle.await.unwrap_err(),
            DispatchError::Provider(TestError::new("upstream down"))
        );
    }
}
