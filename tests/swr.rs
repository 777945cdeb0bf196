// ==============================================
// STALE-WHILE-REVALIDATE (integration)
// ==============================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use stashkit::prelude::*;

fn swr_cache(stale_time: Duration) -> Cache<String> {
    Cache::with_config(CacheConfig {
        stale_while_revalidate: true,
        stale_time: Some(stale_time),
        ..CacheConfig::default()
    })
}

#[tokio::test]
async fn miss_awaits_the_revalidator() {
    let cache = swr_cache(Duration::from_secs(60));
    let value = cache
        .get_stale("x", || async { "fresh".to_string() })
        .await;
    assert_eq!(value, "fresh");
    assert_eq!(cache.get("x"), Some("fresh".to_string()));
}

#[tokio::test]
async fn fresh_entries_are_served_without_revalidation() {
    let cache = swr_cache(Duration::from_secs(60));
    cache.set("x", "cached".to_string());

    let value = cache
        .get_stale("x", || async { unreachable!("entry is fresh") })
        .await;
    assert_eq!(value, "cached");
    assert!(!cache.is_revalidating("x"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_entries_are_served_immediately_and_refreshed_in_background() {
    let cache = swr_cache(Duration::from_millis(10));
    cache.set_with_ttl("x", "stale".to_string(), Duration::from_secs(600));
    std::thread::sleep(Duration::from_millis(30)); // exceed the window, not the TTL

    let value = cache
        .get_stale("x", || async { "refreshed".to_string() })
        .await;
    assert_eq!(value, "stale");

    // The spawned revalidation replaces the value shortly after.
    for _ in 0..50 {
        if cache.get("x").as_deref() == Some("refreshed") {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("background revalidation never landed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn only_one_revalidation_flies_per_key() {
    let cache = swr_cache(Duration::from_millis(10));
    cache.set_with_ttl("x", "stale".to_string(), Duration::from_secs(600));
    std::thread::sleep(Duration::from_millis(30));

    let spawned = Arc::new(AtomicUsize::new(0));
    for _ in 0..5 {
        let counter = Arc::clone(&spawned);
        let value = cache
            .get_stale("x", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                "refreshed".to_string()
            })
            .await;
        assert_eq!(value, "stale");
    }

    // Give the single in-flight revalidation time to finish.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(spawned.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get("x"), Some("refreshed".to_string()));
}

#[tokio::test]
async fn expired_entries_block_on_revalidation() {
    let cache = swr_cache(Duration::from_millis(10));
    cache.set_with_ttl("x", "dead".to_string(), Duration::from_millis(10));
    std::thread::sleep(Duration::from_millis(30));

    let value = cache
        .get_stale("x", || async { "revived".to_string() })
        .await;
    assert_eq!(value, "revived");
    assert_eq!(cache.get("x"), Some("revived".to_string()));
}

#[tokio::test]
async fn explicit_window_overrides_configuration() {
    let cache = swr_cache(Duration::from_secs(600));
    cache.set_with_ttl("x", "old".to_string(), Duration::from_secs(600));
    std::thread::sleep(Duration::from_millis(20));

    // A 1 ms window makes the entry stale despite the generous config.
    let value = cache
        .get_stale_with_ttl("x", || async { "new".to_string() }, Duration::from_millis(1))
        .await;
    assert_eq!(value, "old");

    for _ in 0..50 {
        if cache.get("x").as_deref() == Some("new") {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("background revalidation never landed");
}
