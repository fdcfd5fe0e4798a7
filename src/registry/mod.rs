//! Typed, labeled metric registry.
//!
//! Counters, gauges and histograms are keyed by `(name, labels)`. A name is
//! bound to exactly one [`MetricKind`] for the lifetime of the registry;
//! observing it as another kind is rejected with
//! [`MetricError::TypeKindMismatch`].
//!
//! # Concurrency
//!
//! Families live in a `DashMap`, so each read-modify-write (check kind, find
//! or create series, accumulate) runs under the shard lock of that name only.
//! [`MetricRegistry::snapshot`] copies one shard at a time and never holds a
//! lock across the whole registry.

mod histogram;
mod labels;
mod snapshot;

pub use histogram::{Bucket, DEFAULT_BUCKETS, HistogramSnapshot};
pub use labels::{Labels, is_valid_label_name, is_valid_metric_name};
pub use snapshot::{FamilySnapshot, RegistrySnapshot, SeriesSnapshot, SeriesValue};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::error::MetricError;
use histogram::{HistogramState, valid_buckets};

/// The kind a metric name is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
enum SeriesState {
    Counter(f64),
    Gauge(f64),
    Histogram(HistogramState),
}

impl SeriesState {
    fn new(kind: MetricKind, buckets: &[f64]) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(0.0),
            MetricKind::Gauge => Self::Gauge(0.0),
            MetricKind::Histogram => Self::Histogram(HistogramState::new(buckets)),
        }
    }

    fn snapshot(&self) -> SeriesValue {
        match self {
            Self::Counter(v) => SeriesValue::Counter { value: *v },
            Self::Gauge(v) => SeriesValue::Gauge { value: *v },
            Self::Histogram(h) => SeriesValue::Histogram(h.snapshot()),
        }
    }
}

#[derive(Debug)]
struct Family {
    kind: MetricKind,
    help: String,
    buckets: Vec<f64>,
    series: HashMap<Labels, SeriesState>,
}

impl Family {
    fn check_kind(&self, name: &str, requested: MetricKind) -> Result<(), MetricError> {
        if self.kind == requested {
            Ok(())
        } else {
            Err(MetricError::TypeKindMismatch {
                name: name.to_string(),
                registered: self.kind,
                requested,
            })
        }
    }

    fn series_mut(&mut self, labels: &Labels) -> Result<&mut SeriesState, MetricError> {
        if !self.series.contains_key(labels) {
            labels.validate()?;
        }
        let kind = self.kind;
        let buckets = &self.buckets;
        Ok(self
            .series
            .entry(labels.clone())
            .or_insert_with(|| SeriesState::new(kind, buckets)))
    }
}

/// Process-wide metric store, shared by reference (`Arc<MetricRegistry>`).
#[derive(Debug)]
pub struct MetricRegistry {
    families: DashMap<String, Family>,
    default_buckets: Vec<f64>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    /// Create an empty registry using [`DEFAULT_BUCKETS`] for implicitly
    /// created histograms.
    pub fn new() -> Self {
        Self {
            families: DashMap::new(),
            default_buckets: DEFAULT_BUCKETS.to_vec(),
        }
    }

    /// Create an empty registry with custom default histogram buckets.
    pub fn with_default_buckets(buckets: Vec<f64>) -> Result<Self, MetricError> {
        if !valid_buckets(&buckets) {
            return Err(MetricError::InvalidBuckets("<default>".to_string()));
        }
        Ok(Self {
            families: DashMap::new(),
            default_buckets: buckets,
        })
    }

    pub fn register_counter(&self, name: &str, help: &str) -> Result<(), MetricError> {
        self.register(name, help, MetricKind::Counter, None)
    }

    pub fn register_gauge(&self, name: &str, help: &str) -> Result<(), MetricError> {
        self.register(name, help, MetricKind::Gauge, None)
    }

    /// Register a histogram with explicit bucket boundaries (the `+Inf`
    /// bucket is implicit).
    pub fn register_histogram(
        &self,
        name: &str,
        help: &str,
        buckets: Vec<f64>,
    ) -> Result<(), MetricError> {
        if !valid_buckets(&buckets) {
            return Err(MetricError::InvalidBuckets(name.to_string()));
        }
        self.register(name, help, MetricKind::Histogram, Some(buckets))
    }

    fn register(
        &self,
        name: &str,
        help: &str,
        kind: MetricKind,
        buckets: Option<Vec<f64>>,
    ) -> Result<(), MetricError> {
        let mut family = self.family_mut(name, kind, buckets)?;
        if family.help.is_empty() && !help.is_empty() {
            family.help = help.to_string();
        }
        Ok(())
    }

    /// Add `amount` to the counter series `(name, labels)`.
    pub fn increment_counter(
        &self,
        name: &str,
        labels: &Labels,
        amount: f64,
    ) -> Result<(), MetricError> {
        if amount.is_nan() || amount < 0.0 || amount.is_infinite() {
            return Err(MetricError::InvalidAmount {
                name: name.to_string(),
                amount,
            });
        }
        let mut family = self.family_mut(name, MetricKind::Counter, None)?;
        if let SeriesState::Counter(total) = family.series_mut(labels)? {
            *total += amount;
        }
        Ok(())
    }

    /// Increment a counter by one.
    #[inline]
    pub fn inc(&self, name: &str, labels: &Labels) -> Result<(), MetricError> {
        self.increment_counter(name, labels, 1.0)
    }

    /// Overwrite the gauge series `(name, labels)`.
    pub fn set_gauge(&self, name: &str, labels: &Labels, value: f64) -> Result<(), MetricError> {
        if !value.is_finite() {
            return Err(MetricError::InvalidValue {
                name: name.to_string(),
                value,
            });
        }
        let mut family = self.family_mut(name, MetricKind::Gauge, None)?;
        if let SeriesState::Gauge(current) = family.series_mut(labels)? {
            *current = value;
        }
        Ok(())
    }

    /// Record one observation in the histogram series `(name, labels)`.
    pub fn observe_histogram(
        &self,
        name: &str,
        labels: &Labels,
        value: f64,
    ) -> Result<(), MetricError> {
        if !value.is_finite() {
            return Err(MetricError::InvalidValue {
                name: name.to_string(),
                value,
            });
        }
        let mut family = self.family_mut(name, MetricKind::Histogram, None)?;
        if let SeriesState::Histogram(h) = family.series_mut(labels)? {
            h.observe(value);
        }
        Ok(())
    }

    /// Kind a name is bound to, if registered.
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.families.get(name).map(|f| f.kind)
    }

    /// Number of registered metric names.
    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Copy every family into an immutable snapshot.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut families: Vec<FamilySnapshot> = self
            .families
            .iter()
            .map(|entry| {
                let family = entry.value();
                let mut series: Vec<SeriesSnapshot> = family
                    .series
                    .iter()
                    .map(|(labels, state)| SeriesSnapshot {
                        labels: labels.clone(),
                        value: state.snapshot(),
                    })
                    .collect();
                series.sort_by(|a, b| a.labels.cmp(&b.labels));
                FamilySnapshot {
                    name: entry.key().clone(),
                    help: family.help.clone(),
                    kind: family.kind,
                    series,
                }
            })
            .collect();
        families.sort_by(|a, b| a.name.cmp(&b.name));

        RegistrySnapshot {
            taken_at: Utc::now(),
            families,
        }
    }

    /// Clear every accumulated series.
    ///
    /// Registrations survive, so a name keeps its kind across a reset. Not
    /// meant for request paths; used by administrative tooling and tests.
    pub fn reset(&self) {
        for mut entry in self.families.iter_mut() {
            entry.value_mut().series.clear();
        }
        debug!(families = self.families.len(), "Metric registry reset");
    }

    fn family_mut(
        &self,
        name: &str,
        kind: MetricKind,
        buckets: Option<Vec<f64>>,
    ) -> Result<RefMut<'_, String, Family>, MetricError> {
        let family = match self.families.get_mut(name) {
            Some(family) => family,
            None => {
                if !is_valid_metric_name(name) {
                    return Err(MetricError::InvalidName(name.to_string()));
                }
                self.families.entry(name.to_string()).or_insert_with(|| Family {
                    kind,
                    help: String::new(),
                    buckets: buckets.unwrap_or_else(|| self.default_buckets.clone()),
                    series: HashMap::new(),
                })
            }
        };
        family.check_kind(name, kind)?;
        Ok(family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates() {
        let registry = MetricRegistry::new();
        let labels = Labels::from([("route", "/invoices")]);
        for amount in [1.0, 2.5, 0.0, 4.0] {
            registry.increment_counter("requests_total", &labels, amount).unwrap();
        }
        let snap = registry.snapshot();
        assert_eq!(
            snap.series("requests_total", &labels),
            Some(&SeriesValue::Counter { value: 7.5 })
        );
    }

    #[test]
    fn test_negative_and_nan_amounts_rejected() {
        let registry = MetricRegistry::new();
        let labels = Labels::new();
        registry.inc("jobs_total", &labels).unwrap();

        let err = registry.increment_counter("jobs_total", &labels, -1.0).unwrap_err();
        assert_eq!(err.error_code(), "invalid_amount");
        assert!(registry.increment_counter("jobs_total", &labels, f64::NAN).is_err());
        assert_eq!(registry.snapshot().value_of("jobs_total", &labels), Some(1.0));
    }

    #[test]
    fn test_kind_is_fixed_per_name() {
        let registry = MetricRegistry::new();
        registry.set_gauge("queue_depth", &Labels::new(), 3.0).unwrap();

        let err = registry.inc("queue_depth", &Labels::new()).unwrap_err();
        assert!(matches!(
            err,
            MetricError::TypeKindMismatch {
                registered: MetricKind::Gauge,
                requested: MetricKind::Counter,
                ..
            }
        ));
        assert!(registry.register_histogram("queue_depth", "", vec![1.0]).is_err());
        assert_eq!(registry.kind_of("queue_depth"), Some(MetricKind::Gauge));
    }

    #[test]
    fn test_gauge_last_write_wins_and_rejects_non_finite() {
        let registry = MetricRegistry::new();
        let labels = Labels::from([("pool", "db")]);
        registry.set_gauge("connections", &labels, 10.0).unwrap();
        registry.set_gauge("connections", &labels, -2.0).unwrap();
        assert!(registry.set_gauge("connections", &labels, f64::INFINITY).is_err());
        assert!(registry.set_gauge("connections", &labels, f64::NAN).is_err());
        assert_eq!(registry.snapshot().value_of("connections", &labels), Some(-2.0));
    }

    #[test]
    fn test_histogram_uses_registered_buckets() {
        let registry = MetricRegistry::new();
        registry
            .register_histogram("latency_seconds", "Request latency", vec![0.1, 1.0])
            .unwrap();
        let labels = Labels::new();
        registry.observe_histogram("latency_seconds", &labels, 0.05).unwrap();
        registry.observe_histogram("latency_seconds", &labels, 0.5).unwrap();
        registry.observe_histogram("latency_seconds", &labels, 30.0).unwrap();

        let snap = registry.snapshot();
        let Some(SeriesValue::Histogram(h)) = snap.series("latency_seconds", &labels) else {
            panic!("expected histogram series");
        };
        assert_eq!(h.buckets.len(), 3);
        assert_eq!(h.count, 3);
        assert_eq!(h.buckets[2].cumulative_count, 3);
        assert!(registry.observe_histogram("latency_seconds", &labels, f64::NAN).is_err());
    }

    #[test]
    fn test_invalid_names_rejected() {
        let registry = MetricRegistry::new();
        assert!(matches!(
            registry.inc("bad name", &Labels::new()),
            Err(MetricError::InvalidName(_))
        ));
        assert!(matches!(
            registry.inc("ok_total", &Labels::from([("__x", "1")])),
            Err(MetricError::InvalidLabel(_))
        ));
        assert!(MetricRegistry::with_default_buckets(vec![2.0, 1.0]).is_err());
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let registry = MetricRegistry::new();
        registry.inc("events_total", &Labels::new()).unwrap();
        let before = registry.snapshot();
        registry.inc("events_total", &Labels::new()).unwrap();
        assert_eq!(before.value_of("events_total", &Labels::new()), Some(1.0));
        assert_eq!(registry.snapshot().value_of("events_total", &Labels::new()), Some(2.0));
    }

    #[test]
    fn test_reset_keeps_kinds() {
        let registry = MetricRegistry::new();
        registry.inc("errors_total", &Labels::new()).unwrap();
        registry.reset();
        assert_eq!(registry.snapshot().value_of("errors_total", &Labels::new()), None);
        assert!(registry.set_gauge("errors_total", &Labels::new(), 1.0).is_err());
    }
}
