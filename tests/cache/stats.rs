//! Statistics accounting and the reporter callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use keywork_cache::{BoundedCache, CacheConfig, Lookup, LookupKind, SharedCache};
use parking_lot::Mutex;

#[test]
fn every_terminal_outcome_is_counted() {
    let mut cache = BoundedCache::new(
        CacheConfig::builder()
            .capacity(8)
            .key_validator(|k: &String| !k.is_empty())
            .build(),
    );

    cache.set("present".to_string(), 1).unwrap();
    cache.set_absent("absent".to_string()).unwrap();

    cache.get(&"present".to_string());
    cache.get(&"present".to_string());
    cache.get(&"absent".to_string());
    cache.get(&"nothing".to_string());
    cache.get(&String::new());

    let stats = cache.stats();
    assert_eq!(stats.hit_present, 2);
    assert_eq!(stats.hit_absent, 1);
    assert_eq!(stats.miss, 1);
    assert_eq!(stats.invalid_key, 1);
    assert!((stats.hit_rate() - 0.75).abs() < 1e-9);
}

#[test]
fn reporter_sees_each_lookup_with_a_fresh_snapshot() {
    let outcomes: Arc<Mutex<Vec<LookupKind>>> = Arc::new(Mutex::new(Vec::new()));
    let outcomes_clone = Arc::clone(&outcomes);
    let mut cache = BoundedCache::new(
        CacheConfig::builder()
            .capacity(8)
            .stats_reporter(move |snapshot, kind| {
                assert!(snapshot.lookups() > 0);
                outcomes_clone.lock().push(kind);
            })
            .build(),
    );

    cache.set("k", 1).unwrap();
    cache.get(&"k");
    cache.get(&"gone");

    let seen = outcomes.lock();
    assert_eq!(*seen, vec![LookupKind::Hit, LookupKind::Miss]);
}

#[test]
fn shared_cache_counts_across_clones() {
    let cache = SharedCache::with_capacity(8);
    let other = cache.clone();

    cache.set("k", 1).unwrap();
    assert_eq!(other.get(&"k"), Lookup::Hit(1));
    assert_eq!(cache.get(&"k"), Lookup::Hit(1));
    assert_eq!(other.get(&"x"), Lookup::Miss);

    let stats = cache.stats();
    assert_eq!(stats.hit_present, 2);
    assert_eq!(stats.miss, 1);
}

#[test]
fn reset_opens_a_new_boundary() {
    let mut cache = BoundedCache::with_capacity(8);
    cache.set("k", 1).unwrap();
    cache.get(&"k");
    let boundary = cache.stats_boundary();

    cache.reset_stats();
    assert_eq!(cache.stats().lookups(), 0);
    assert!(cache.stats_boundary() > boundary);
}

#[test]
fn hit_listener_and_stats_agree() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let mut cache = BoundedCache::new(
        CacheConfig::builder()
            .capacity(8)
            .on_hit(move || {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
    );

    cache.set("k", 1).unwrap();
    for _ in 0..5 {
        cache.get(&"k");
    }
    assert_eq!(hits.load(Ordering::SeqCst), 5);
    assert_eq!(cache.stats().hit_present, 5);
}
