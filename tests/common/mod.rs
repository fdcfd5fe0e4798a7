//! Integration test common infrastructure.
//!
//! Provides recording and failing notification channels, builders for the
//! engine components, and an in-process HTTP server.

pub mod channels;
pub mod server;

#[allow(unused_imports)]
pub use channels::{FailingChannel, RecordingChannel};
#[allow(unused_imports)]
pub use server::TestServer;

use pulsewatch::alerting::{AlertEvaluator, ChannelRegistry};
use pulsewatch::config::{AlertingConfig, CacheConfig};
use pulsewatch::metrics::InternalMetrics;
use pulsewatch::{CacheEngine, EvictionPolicy, MetricRegistry};
use std::sync::Arc;
use std::time::Duration;

/// Registry, channels and evaluator wired together the way the daemon does.
#[allow(dead_code)]
pub struct Harness {
    pub registry: Arc<MetricRegistry>,
    pub channels: Arc<ChannelRegistry>,
    pub evaluator: Arc<AlertEvaluator>,
    pub metrics: Arc<InternalMetrics>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_config(AlertingConfig::default())
    }

    pub fn with_config(config: AlertingConfig) -> Self {
        let metrics = Arc::new(InternalMetrics::new().expect("internal metrics"));
        let registry = Arc::new(MetricRegistry::new());
        let channels = Arc::new(ChannelRegistry::new(
            config.dispatch_timeout(),
            Arc::clone(&metrics),
        ));
        let evaluator = Arc::new(AlertEvaluator::new(
            Arc::clone(&registry),
            Arc::clone(&channels),
            Arc::clone(&metrics),
            &config,
        ));
        Self {
            registry,
            channels,
            evaluator,
            metrics,
        }
    }

    /// Register a recording channel under `id`.
    pub fn recorder(&self, id: &str) -> Arc<RecordingChannel> {
        let channel = RecordingChannel::new(id);
        self.channels.add(channel.clone());
        channel
    }
}

/// A cache with the given capacity and policy, default TTL 60s.
#[allow(dead_code)]
pub fn cache(max_entries: usize, policy: EvictionPolicy) -> Arc<CacheEngine> {
    let config = CacheConfig {
        default_ttl_secs: 60,
        max_entries,
        eviction_policy: policy,
        cleanup_interval_secs: 1,
    };
    let metrics = Arc::new(InternalMetrics::new().expect("internal metrics"));
    Arc::new(CacheEngine::new(config, metrics))
}

/// Evaluation interval used by the lifecycle tests.
#[allow(dead_code)]
pub const TICK: Duration = Duration::from_secs(30);
