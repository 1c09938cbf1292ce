//! Priority preemption with provider reuse.

use super::{StepProvider, TestError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keywork_jobs::{JobConfig, JobError, JobManager};
use parking_lot::Mutex;

#[tokio::test]
async fn higher_priority_arrival_preempts_and_the_victim_resumes() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let constructions_clone = Arc::clone(&constructions);
    let manager: JobManager<String, String, TestError, u32> = JobManager::new(
        JobConfig::builder(move |key: &String, ctx| {
            constructions_clone.fetch_add(1, Ordering::SeqCst);
            StepProvider::new(key, ctx, Duration::from_millis(15))
        })
        .max_running(1)
        .max_queued(1)
        .build(),
    );

    // X runs; Y waits; Z outranks everyone.
    let x = manager.fetch_with("X".to_string(), 1.0);
    tokio::time::sleep(Duration::from_millis(25)).await;
    let y = manager.fetch_with("Y".to_string(), 1.0);
    let z = manager.fetch_with("Z".to_string(), 5.0);

    // Y is displaced from the single queue slot by Z's arrival.
    assert_eq!(y.result().await.unwrap_err(), JobError::EvictedDueToPriority);

    // Z preempts X and completes first.
    assert_eq!(z.result().await.unwrap(), "Z:runs=1");

    // X resumes from its retained instance: two runs, one construction.
    assert_eq!(x.result().await.unwrap(), "X:runs=2");
    assert_eq!(constructions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn preemption_listener_reports_reuse() {
    let preemptions: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let preemptions_clone = Arc::clone(&preemptions);
    let manager: JobManager<String, String, TestError, u32> = JobManager::new(
        JobConfig::builder(|key: &String, ctx| {
            StepProvider::new(key, ctx, Duration::from_millis(15))
        })
        .max_running(1)
        .on_preempted(move |reuse| {
            preemptions_clone.lock().push(reuse);
        })
        .build(),
    );

    let x = manager.fetch_with("X".to_string(), 1.0);
    tokio::time::sleep(Duration::from_millis(25)).await;
    let z = manager.fetch_with("Z".to_string(), 5.0);

    z.result().await.unwrap();
    x.result().await.unwrap();

    assert_eq!(*preemptions.lock(), vec![true]);
}

#[tokio::test]
async fn equal_priority_does_not_preempt() {
    let manager: JobManager<String, String, TestError, u32> = JobManager::new(
        JobConfig::builder(|key: &String, ctx| {
            StepProvider::new(key, ctx, Duration::from_millis(10))
        })
        .max_running(1)
        .build(),
    );

    let first = manager.fetch_with("first".to_string(), 3.0);
    tokio::time::sleep(Duration::from_millis(15)).await;
    let second = manager.fetch_with("second".to_string(), 3.0);

    // The first job runs to completion in a single run.
    assert_eq!(first.result().await.unwrap(), "first:runs=1");
    assert_eq!(second.result().await.unwrap(), "second:runs=1");
}

#[tokio::test]
async fn preempted_work_keeps_its_progress() {
    let manager: JobManager<String, String, TestError, u32> = JobManager::new(
        JobConfig::builder(|key: &String, ctx| {
            StepProvider::new(key, ctx, Duration::from_millis(15))
        })
        .max_running(1)
        .build(),
    );

    let mut x = manager.fetch_with("X".to_string(), 1.0);

    // Let X make observable progress before the preemption.
    let first_tick = loop {
        match x.next().await.unwrap() {
            keywork_jobs::JobUpdate::Event(progress) => break progress,
            keywork_jobs::JobUpdate::Done(_) => panic!("finished too early"),
        }
    };
    assert!(first_tick >= 20);

    let z = manager.fetch_with("Z".to_string(), 9.0);
    z.result().await.unwrap();

    // After resuming, X continues past its pre-preemption progress and
    // reports the second run in its terminal value.
    let (later_events, result) = x.collect().await;
    assert!(later_events.iter().all(|progress| *progress > first_tick));
    assert_eq!(result.unwrap(), "X:runs=2");
}
