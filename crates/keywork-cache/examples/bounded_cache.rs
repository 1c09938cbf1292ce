use std::time::Duration;

use keywork_cache::{BoundedCache, CacheConfig, EntryOptions, Lookup};

fn main() {
    println!("Bounded Cache Example\n");

    // A cache of at most 3 entries / 1 KiB, with jittered five-second TTLs.
    let config = CacheConfig::builder()
        .capacity(3)
        .memory_limit(1024)
        .cost_fn(|v: &String| v.len() as u64)
        .default_ttl(Duration::from_secs(5))
        .ttl_jitter(Duration::from_millis(500))
        .name("example-cache")
        .on_eviction(|| println!("  (an entry was evicted)"))
        .build();
    let mut cache = BoundedCache::new(config);

    cache.set("alpha", "first value".to_string()).unwrap();
    cache.set("beta", "second value".to_string()).unwrap();
    cache
        .set_with(
            "gamma",
            "important value".to_string(),
            EntryOptions::priority(10.0),
        )
        .unwrap();

    // A fourth entry displaces the least valuable resident, never "gamma".
    cache.set("delta", "fourth value".to_string()).unwrap();

    for key in ["alpha", "beta", "gamma", "delta"] {
        match cache.get(&key) {
            Lookup::Hit(value) => println!("{key}: {value}"),
            Lookup::HitAbsent => println!("{key}: known absent"),
            Lookup::Miss => println!("{key}: miss"),
            Lookup::InvalidKey => println!("{key}: invalid"),
        }
    }

    // Negative caching: remember that a key does not exist.
    cache.set_absent("ghost").unwrap();
    assert_eq!(cache.get(&"ghost"), Lookup::HitAbsent);

    let stats = cache.stats();
    println!(
        "\n{} lookups, hit rate {:.0}%",
        stats.lookups(),
        stats.hit_rate() * 100.0
    );
}
