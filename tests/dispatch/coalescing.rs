//! Per-key coalescing and result-cache accounting.

use super::TestError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keywork_cache::CacheConfig;
use keywork_dispatch::{DispatchConfig, Dispatcher, Provider};

#[tokio::test]
async fn ten_concurrent_demands_one_provider_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let provider = Provider::async_fn(move |key: String| {
        let calls = Arc::clone(&calls_clone);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, TestError>(format!("value:{key}"))
        }
    });
    let dispatcher = Dispatcher::new(
        DispatchConfig::builder(provider)
            .max_running(1)
            .result_cache(CacheConfig::builder().capacity(64).build())
            .build(),
    );

    let handles: Vec<_> = (0..10).map(|_| dispatcher.fetch("A".to_string())).collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "value:A");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The admitting fetch missed; the nine coalesced subscribers were
    // served through the cache.
    let stats = dispatcher.cache().unwrap().stats();
    assert_eq!(stats.miss, 1);
    assert_eq!(stats.hit_present, 9);
}

#[tokio::test]
async fn cached_results_answer_later_fetches_without_the_provider() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let provider = Provider::async_fn(move |key: u32| {
        let calls = Arc::clone(&calls_clone);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TestError>(key * 10)
        }
    });
    let dispatcher = Dispatcher::new(
        DispatchConfig::builder(provider)
            .result_cache(CacheConfig::builder().capacity(64).build())
            .build(),
    );

    assert_eq!(dispatcher.fetch(3).await.unwrap(), 30);
    assert_eq!(dispatcher.fetch(3).await.unwrap(), 30);
    assert_eq!(dispatcher.fetch(3).await.unwrap(), 30);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn different_keys_run_independently() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let provider = Provider::async_fn(move |key: u32| {
        let calls = Arc::clone(&calls_clone);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, TestError>(key)
        }
    });
    let dispatcher = Dispatcher::new(DispatchConfig::builder(provider).max_running(4).build());

    let handles = dispatcher.fetch_many(0..5);
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), i as u32);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn cache_ttl_expiry_reaches_the_provider_again() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let provider = Provider::async_fn(move |key: u32| {
        let calls = Arc::clone(&calls_clone);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TestError>(key)
        }
    });
    let dispatcher = Dispatcher::new(
        DispatchConfig::builder(provider)
            .result_cache(
                CacheConfig::builder()
                    .capacity(64)
                    .default_ttl(Duration::from_millis(30))
                    .build(),
            )
            .build(),
    );

    dispatcher.fetch(1).await.unwrap();
    dispatcher.fetch(1).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    dispatcher.fetch(1).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dropping_a_handle_detaches_only_that_subscriber() {
    let provider = Provider::async_fn(move |key: String| async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok::<_, TestError>(key)
    });
    let dispatcher = Dispatcher::new(DispatchConfig::builder(provider).build());

    let kept = dispatcher.fetch("k".to_string());
    let dropped = dispatcher.fetch("k".to_string());
    drop(dropped);

    assert_eq!(kept.await.unwrap(), "k");
}
