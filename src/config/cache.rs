//! Cache engine configuration.

use serde::Deserialize;
use std::time::Duration;

use crate::cache::EvictionPolicy;

/// Bounded TTL cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without one (default: 300).
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Maximum number of stored entries (default: 10000).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Which entry to evict when full (default: lru).
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
    /// Seconds between background expiry sweeps (default: 60).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            eviction_policy: EvictionPolicy::default(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_max_entries() -> usize {
    10_000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}
