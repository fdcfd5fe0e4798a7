//! Periodic removal of expired cache entries.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::CacheEngine;

/// Spawn the cache sweep task.
///
/// Runs every `cache.cleanup_interval_secs` and removes entries nobody has
/// read since they expired. The task holds a weak reference and exits once
/// the engine is dropped.
pub fn spawn_cleanup_task(cache: &Arc<CacheEngine>) -> JoinHandle<()> {
    let period = cache
        .config()
        .cleanup_interval()
        .max(Duration::from_millis(1));
    let cache: Weak<CacheEngine> = Arc::downgrade(cache);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(cache) = cache.upgrade() else {
                info!("Cache dropped, stopping sweep task");
                break;
            };
            let removed = cache.sweep_expired();
            if removed > 0 {
                debug!(removed, "Swept expired cache entries");
            }
        }
    })
}
