//! Event ordering, replay, cancellation and the stop grace window.

use super::{StepProvider, TestError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keywork_jobs::{
    JobConfig, JobContext, JobError, JobManager, JobProvider, JobUpdate, StopAction,
};

fn step_manager(tick: Duration) -> JobManager<String, String, TestError, u32> {
    JobManager::new(
        JobConfig::builder(move |key: &String, ctx| StepProvider::new(key, ctx, tick)).build(),
    )
}

#[tokio::test]
async fn every_subscriber_sees_events_in_emission_order_then_the_result() {
    let manager = step_manager(Duration::from_millis(10));

    let first = manager.fetch("a".to_string());
    let second = manager.fetch("a".to_string());

    for subscription in [first, second] {
        let (events, result) = subscription.collect().await;
        assert_eq!(events, vec![20, 40, 60, 80]);
        assert_eq!(result.unwrap(), "a:runs=1");
    }
}

#[tokio::test]
async fn late_subscribers_catch_up_through_replay() {
    let manager = step_manager(Duration::from_millis(15));

    let early = manager.fetch("a".to_string());
    // Attach after some progress happened.
    tokio::time::sleep(Duration::from_millis(40)).await;
    let mut late = manager.fetch("a".to_string());

    // The late subscriber's first updates are the replayed ticks, in the
    // original emission order.
    let mut replayed = Vec::new();
    while let Some(update) = late.next().await {
        match update {
            JobUpdate::Event(event) => replayed.push(event),
            JobUpdate::Done(result) => {
                assert_eq!(result.unwrap(), "a:runs=1");
                break;
            }
        }
    }
    assert!(!replayed.is_empty());
    let mut sorted = replayed.clone();
    sorted.sort_unstable();
    assert_eq!(replayed, sorted);

    early.result().await.unwrap();
}

#[tokio::test]
async fn repeated_cancel_notifies_each_subscriber_once() {
    let manager = step_manager(Duration::from_millis(20));

    let mut subscriptions = Vec::new();
    for _ in 0..3 {
        subscriptions.push(manager.fetch("a".to_string()));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    manager.cancel(&"a".to_string());
    manager.cancel(&"a".to_string());
    manager.cancel(&"a".to_string());

    for subscription in subscriptions {
        // Exactly one terminal arrives despite the repeated cancels.
        let (_events, result) = subscription.collect().await;
        assert_eq!(result.unwrap_err(), JobError::Cancelled);
    }
    assert_eq!(manager.running_len(), 0);
}

#[tokio::test]
async fn stop_overrunning_the_grace_window_surfaces_timed_out() {
    struct StubbornProvider {
        ctx: JobContext<String, TestError, u32>,
    }

    impl JobProvider<String, TestError, u32> for StubbornProvider {
        fn start(&mut self) {
            // Never completes; only reacts (badly) to stop.
            let _ = &self.ctx;
        }

        fn stop(&mut self) -> StopAction {
            std::thread::sleep(Duration::from_millis(300));
            StopAction::Reuse
        }
    }

    let manager: JobManager<String, String, TestError, u32> = JobManager::new(
        JobConfig::builder(|_key: &String, ctx| StubbornProvider { ctx })
            .stop_grace(Duration::from_millis(40))
            .build(),
    );

    let subscription = manager.fetch("stuck".to_string());
    tokio::time::sleep(Duration::from_millis(10)).await;
    manager.cancel(&"stuck".to_string());

    let result = subscription.result().await;
    assert_eq!(result.unwrap_err(), JobError::StopTimedOut);
    assert_eq!(manager.running_len(), 0);
}

#[tokio::test]
async fn queue_overflow_notifies_the_displaced_job() {
    let manager: JobManager<String, String, TestError, u32> = JobManager::new(
        JobConfig::builder(|key: &String, ctx| {
            StepProvider::new(key, ctx, Duration::from_millis(15))
        })
        .max_running(1)
        .max_queued(1)
        .build(),
    );

    let running = manager.fetch_with("running".to_string(), 5.0);
    tokio::time::sleep(Duration::from_millis(5)).await;
    let doomed = manager.fetch_with("doomed".to_string(), 1.0);
    let strong = manager.fetch_with("strong".to_string(), 5.0);

    assert_eq!(
        doomed.result().await.unwrap_err(),
        JobError::EvictedDueToPriority
    );
    // With equal running priority nothing is preempted outright; the
    // stronger job runs once the first finishes.
    running.result().await.unwrap();
    strong.result().await.unwrap();
}

#[tokio::test]
async fn provider_failure_reaches_every_subscriber() {
    struct DoomedProvider {
        ctx: JobContext<String, TestError, u32>,
    }

    impl JobProvider<String, TestError, u32> for DoomedProvider {
        fn start(&mut self) {
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                ctx.emit(10);
                ctx.complete(Err(TestError::new("checksum mismatch")));
            });
        }

        fn stop(&mut self) -> StopAction {
            StopAction::Dealloc
        }
    }

    let manager: JobManager<String, String, TestError, u32> =
        JobManager::new(JobConfig::builder(|_key: &String, ctx| DoomedProvider { ctx }).build());

    let first = manager.fetch("a".to_string());
    let second = manager.fetch("a".to_string());
    for subscription in [first, second] {
        let (events, result) = subscription.collect().await;
        assert_eq!(events, vec![10]);
        assert_eq!(
            result.unwrap_err(),
            JobError::Provider(TestError::new("checksum mismatch"))
        );
    }
    // The manager never retries a failed job on its own.
    assert_eq!(manager.running_len(), 0);
    assert_eq!(manager.queued_len(), 0);
}

#[tokio::test]
async fn start_panic_fails_the_job() {
    struct ExplodingProvider;

    impl JobProvider<String, TestError, u32> for ExplodingProvider {
        fn start(&mut self) {
            panic!("bad provider");
        }

        fn stop(&mut self) -> StopAction {
            StopAction::Dealloc
        }
    }

    let manager: JobManager<String, String, TestError, u32> =
        JobManager::new(JobConfig::builder(|_key: &String, _ctx| ExplodingProvider).build());

    let result = manager.fetch("a".to_string()).result().await;
    assert_eq!(result.unwrap_err(), JobError::Panicked);
    assert_eq!(manager.running_len(), 0);
}

#[tokio::test]
async fn completion_listener_fires() {
    let completions = Arc::new(AtomicUsize::new(0));
    let completions_clone = Arc::clone(&completions);
    let manager: JobManager<String, String, TestError, u32> = JobManager::new(
        JobConfig::builder(|key: &String, ctx| {
            StepProvider::new(key, ctx, Duration::from_millis(5))
        })
        .on_completed(move || {
            completions_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build(),
    );

    manager.fetch("a".to_string()).result().await.unwrap();
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}
