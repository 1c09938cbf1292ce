use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keywork_coalesce::{CoalesceConfig, Coalescer, RetryPolicy};

#[derive(Debug, Clone)]
struct FetchError;

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fetch failed")
    }
}

#[tokio::main]
async fn main() {
    println!("Single-Flight Example\n");

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);

    let config = CoalesceConfig::builder()
        .retry(RetryPolicy::exponential(3, Duration::from_millis(50)))
        .result_ttl(Duration::from_secs(10))
        .name("config-load")
        .build();

    let loader: Coalescer<String, FetchError> = Coalescer::with_config(
        move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                println!("  producer invoked (call #{call})");
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok("remote configuration".to_string())
            }
        },
        config,
    );

    // Twenty concurrent demands, one producer invocation.
    let mut handles = Vec::new();
    for _ in 0..20 {
        let loader = loader.clone();
        handles.push(tokio::spawn(async move { loader.execute().await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    println!("20 callers served by {} call(s)", calls.load(Ordering::SeqCst));

    // While the result is fresh, nobody pays for another load.
    loader.execute().await.unwrap();
    println!(
        "still {} call(s) after a cached read",
        calls.load(Ordering::SeqCst)
    );
}
