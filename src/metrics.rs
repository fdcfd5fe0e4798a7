//! Prometheus self-instrumentation for pulsewatch.
//!
//! These metrics describe the engine itself (cache efficiency, evaluator
//! health, notification delivery), as opposed to the application metrics
//! held by [`crate::registry::MetricRegistry`]. They are exported on the same
//! `/metrics` endpoint, appended after the registry families.
//!
//! - `pulsewatch_cache_requests_total{result}` - Cache lookups by hit/miss
//! - `pulsewatch_cache_evictions_total{policy}` - Entries evicted at capacity
//! - `pulsewatch_alert_evaluation_duration_seconds` - Evaluation pass latency
//! - `pulsewatch_notifications_total{channel, result}` - Delivery outcomes

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Engine-level metrics backed by a private Prometheus registry.
///
/// Constructed once at startup and shared via `Arc`.
#[derive(Clone)]
pub struct InternalMetrics {
    registry: Registry,

    // ========================================================================
    // Cache
    // ========================================================================
    pub cache_requests: IntCounterVec,
    pub cache_evictions: IntCounterVec,
    pub cache_expirations: IntCounterVec,
    pub cache_errors: IntCounterVec,
    pub cache_entries: IntGauge,

    // ========================================================================
    // Alerting
    // ========================================================================
    pub alert_evaluations: IntCounter,
    pub alert_evaluation_duration: Histogram,
    pub rule_errors: IntCounterVec,
    pub alerts_triggered: IntCounterVec,
    pub alerts_resolved: IntCounterVec,
    pub active_alerts: IntGauge,

    // ========================================================================
    // Notifications
    // ========================================================================
    pub notifications: IntCounterVec,
    pub notification_failures: IntCounterVec,
    pub notification_latency: HistogramVec,
}

impl std::fmt::Debug for InternalMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalMetrics").finish_non_exhaustive()
    }
}

impl InternalMetrics {
    /// Create and register all engine metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Helper macro to create and register a metric
        macro_rules! register {
            ($init:expr) => {{
                let m = $init?;
                registry.register(Box::new(m.clone()))?;
                m
            }};
        }

        let cache_requests = register!(IntCounterVec::new(
            Opts::new("pulsewatch_cache_requests_total", "Cache lookups by result"),
            &["result"]
        ));
        let cache_evictions = register!(IntCounterVec::new(
            Opts::new("pulsewatch_cache_evictions_total", "Entries evicted at capacity"),
            &["policy"]
        ));
        let cache_expirations = register!(IntCounterVec::new(
            Opts::new("pulsewatch_cache_expirations_total", "Expired entries removed"),
            &["path"]
        ));
        let cache_errors = register!(IntCounterVec::new(
            Opts::new("pulsewatch_cache_errors_total", "Swallowed cache errors"),
            &["operation", "error"]
        ));
        let cache_entries = register!(IntGauge::new(
            "pulsewatch_cache_entries",
            "Entries currently stored"
        ));

        let alert_evaluations = register!(IntCounter::new(
            "pulsewatch_alert_evaluations_total",
            "Completed evaluation passes"
        ));
        let alert_evaluation_duration = register!(Histogram::with_opts(
            HistogramOpts::new(
                "pulsewatch_alert_evaluation_duration_seconds",
                "Evaluation pass latency"
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0])
        ));
        let rule_errors = register!(IntCounterVec::new(
            Opts::new("pulsewatch_rule_errors_total", "Rule evaluations that failed"),
            &["rule", "error"]
        ));
        let alerts_triggered = register!(IntCounterVec::new(
            Opts::new("pulsewatch_alerts_triggered_total", "Alert trigger notifications"),
            &["rule", "severity"]
        ));
        let alerts_resolved = register!(IntCounterVec::new(
            Opts::new("pulsewatch_alerts_resolved_total", "Alerts resolved"),
            &["rule"]
        ));
        let active_alerts = register!(IntGauge::new(
            "pulsewatch_active_alerts",
            "Alerts currently firing or acknowledged"
        ));

        let notifications = register!(IntCounterVec::new(
            Opts::new("pulsewatch_notifications_total", "Notification deliveries"),
            &["channel", "result"]
        ));
        let notification_failures = register!(IntCounterVec::new(
            Opts::new(
                "pulsewatch_notification_failures_total",
                "Failed notification deliveries by error"
            ),
            &["channel", "error"]
        ));
        let notification_latency = register!(HistogramVec::new(
            HistogramOpts::new(
                "pulsewatch_notification_duration_seconds",
                "Notification delivery latency"
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["channel"]
        ));

        Ok(Self {
            registry,
            cache_requests,
            cache_evictions,
            cache_expirations,
            cache_errors,
            cache_entries,
            alert_evaluations,
            alert_evaluation_duration,
            rule_errors,
            alerts_triggered,
            alerts_resolved,
            active_alerts,
            notifications,
            notification_failures,
            notification_latency,
        })
    }

    /// Gather all metrics and encode them in Prometheus text format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            return String::new();
        }
        match String::from_utf8(buffer) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
                String::new()
            }
        }
    }

    // ============================================================================
    // Helper functions for hot-path updates
    // ============================================================================

    #[inline]
    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_requests.with_label_values(&[result]).inc();
    }

    #[inline]
    pub fn record_cache_error(&self, operation: &str, error: &str) {
        self.cache_errors.with_label_values(&[operation, error]).inc();
    }

    #[inline]
    pub fn record_notification(&self, channel: &str, duration_secs: f64, error: Option<&str>) {
        self.notification_latency
            .with_label_values(&[channel])
            .observe(duration_secs);
        match error {
            None => self.notifications.with_label_values(&[channel, "ok"]).inc(),
            Some(code) => {
                self.notifications.with_label_values(&[channel, "error"]).inc();
                self.notification_failures
                    .with_label_values(&[channel, code])
                    .inc();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        let metrics = InternalMetrics::new().unwrap();

        metrics.record_cache_lookup(true);
        metrics.record_notification("slack", 0.2, Some("timeout"));

        let output = metrics.gather();
        assert!(output.contains("pulsewatch_cache_requests_total{result=\"hit\"} 1"));
        assert!(output.contains("pulsewatch_notification_failures_total"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = InternalMetrics::new().unwrap();
        let b = InternalMetrics::new().unwrap();
        a.alert_evaluations.inc();
        assert_eq!(a.alert_evaluations.get(), 1);
        assert_eq!(b.alert_evaluations.get(), 0);
    }
}
