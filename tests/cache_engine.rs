//! Integration tests for the TTL cache.

mod common;

use bytes::Bytes;
use futures_util::future::join_all;
use pulsewatch::cache::spawn_cleanup_task;
use pulsewatch::{EvictionPolicy, KeyPattern};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Point {
    x: i32,
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let cache = common::cache(10, EvictionPolicy::Lru);
    cache.set_json("a", &Point { x: 1 }, Some(Duration::from_secs(1)));
    assert_eq!(cache.get_json::<Point>("a"), Some(Point { x: 1 }));

    tokio::time::advance(Duration::from_millis(1500)).await;
    assert_eq!(cache.get_json::<Point>("a"), None);
    assert!(cache.is_empty());
    assert_eq!(cache.stats().expirations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_lru_evicts_least_recently_used() {
    let cache = common::cache(2, EvictionPolicy::Lru);
    cache.set("a", "1", None);
    cache.set("b", "2", None);
    assert!(cache.get("a").is_some());
    cache.set("c", "3", None);

    assert!(cache.contains("a"));
    assert!(!cache.contains("b"));
    assert!(cache.contains("c"));
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_size_never_exceeds_capacity() {
    for policy in [EvictionPolicy::Lru, EvictionPolicy::Lfu, EvictionPolicy::Fifo] {
        let cache = common::cache(16, policy);
        for i in 0..200 {
            cache.set(&format!("key:{i}"), Bytes::from(vec![0u8; 8]), None);
            if i % 3 == 0 {
                cache.get(&format!("key:{}", i / 2));
            }
            assert!(cache.len() <= 16, "{policy} exceeded capacity");
        }
        let stats = cache.stats();
        assert_eq!(stats.entries, 16);
        assert_eq!(stats.evictions, 184);
        // Keys run from "key:0" to "key:199", five to seven bytes each.
        assert!((16 * (8 + 5)..=16 * (8 + 7)).contains(&stats.memory_bytes));
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_flight_runs_factory_once() {
    let cache = common::cache(10, EvictionPolicy::Lru);
    let calls = Arc::new(AtomicUsize::new(0));

    let lookups = (0..8).map(|_| {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            cache
                .get_or_compute_single_flight(
                    "report",
                    || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Bytes::from_static(b"computed")
                    },
                    None,
                )
                .await
        })
    });
    let values = join_all(lookups).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for value in values {
        assert_eq!(value.unwrap(), Bytes::from_static(b"computed"));
    }
    assert_eq!(cache.get("report"), Some(Bytes::from_static(b"computed")));
}

#[tokio::test(start_paused = true)]
async fn test_compute_errors_are_not_cached() {
    let cache = common::cache(10, EvictionPolicy::Lru);

    let failed: Result<Bytes, &str> = cache
        .get_or_try_compute("user:1", || async { Err("backend down") }, None)
        .await;
    assert_eq!(failed, Err("backend down"));
    assert!(!cache.contains("user:1"));

    let ok: Result<Bytes, &str> = cache
        .get_or_try_compute("user:1", || async { Ok(Bytes::from_static(b"alice")) }, None)
        .await;
    assert_eq!(ok, Ok(Bytes::from_static(b"alice")));

    // Served from cache; the factory is not consulted.
    let cached = cache
        .get_or_compute("user:1", || async { Bytes::from_static(b"bob") }, None)
        .await;
    assert_eq!(cached, Bytes::from_static(b"alice"));
}

#[tokio::test(start_paused = true)]
async fn test_pattern_invalidation() {
    let cache = common::cache(10, EvictionPolicy::Fifo);
    for key in ["user:1", "user:2", "session:1", "config"] {
        cache.set(key, "v", None);
    }

    assert_eq!(cache.invalidate_by_pattern(&KeyPattern::substring("user:")), 2);
    assert_eq!(
        cache.invalidate_by_pattern(&KeyPattern::regex("^session:\\d+$").unwrap()),
        1
    );
    assert!(cache.contains("config"));
    assert!(KeyPattern::regex("(unclosed").is_err());
    assert_eq!(cache.clear(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_task_reclaims_unread_entries() {
    let cache = common::cache(10, EvictionPolicy::Lru);
    cache.set("short", "v", Some(Duration::from_millis(500)));
    cache.set("long", "v", Some(Duration::from_secs(30)));
    let task = spawn_cleanup_task(&cache);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(cache.len(), 1);
    assert!(cache.contains("long"));
    assert_eq!(cache.stats().expirations, 1);

    drop(cache);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(task.is_finished());
}
