//! pulsewatch - metrics registry, TTL cache and alert rule evaluation.
//!
//! Three cooperating subsystems, each constructed once and shared by `Arc`:
//!
//! - [`registry::MetricRegistry`]: typed counters, gauges and histograms
//!   keyed by name and label set, with Prometheus and JSON export.
//! - [`cache::CacheEngine`]: bounded key-value cache with per-entry TTL and
//!   LRU/LFU/FIFO eviction.
//! - [`alerting::AlertEvaluator`]: periodic threshold evaluation over the
//!   registry with cooldown-gated alerts and notification dispatch.
//!
//! [`http::AppState`] wires them together from a [`config::Config`].

pub mod alerting;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod telemetry;

pub use alerting::{AlertEvaluator, AlertRule, Condition, Operator, Severity};
pub use cache::{CacheEngine, EvictionPolicy, KeyPattern};
pub use config::Config;
pub use http::AppState;
pub use registry::{Labels, MetricKind, MetricRegistry};
