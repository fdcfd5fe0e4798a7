//! Immutable registry snapshots and their export formats.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

use super::histogram::HistogramSnapshot;
use super::labels::Labels;
use super::MetricKind;

/// Value of one series at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SeriesValue {
    Counter { value: f64 },
    Gauge { value: f64 },
    Histogram(HistogramSnapshot),
}

impl SeriesValue {
    /// Scalar view used by alert rules: counters and gauges report their
    /// value, histograms their mean.
    pub fn scalar(&self) -> Option<f64> {
        match self {
            Self::Counter { value } | Self::Gauge { value } => Some(*value),
            Self::Histogram(h) => h.mean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSnapshot {
    pub labels: Labels,
    pub value: SeriesValue,
}

/// All series of one metric name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilySnapshot {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub series: Vec<SeriesSnapshot>,
}

/// A point-in-time copy of the whole registry.
///
/// Families are sorted by name and series by label set, so two snapshots of
/// the same state render identically.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub taken_at: DateTime<Utc>,
    pub families: Vec<FamilySnapshot>,
}

impl RegistrySnapshot {
    pub fn family(&self, name: &str) -> Option<&FamilySnapshot> {
        self.families
            .binary_search_by(|f| f.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.families[idx])
    }

    /// Exact series lookup.
    pub fn series(&self, name: &str, labels: &Labels) -> Option<&SeriesValue> {
        self.family(name)?
            .series
            .iter()
            .find(|s| &s.labels == labels)
            .map(|s| &s.value)
    }

    /// Scalar value of `name` across every series whose labels match `filter`.
    ///
    /// Counters and gauges are summed. Histograms are merged and yield the
    /// mean of all matching observations. Returns `None` when the metric is
    /// unknown, no series matches, or a histogram has no observations.
    pub fn value_of(&self, name: &str, filter: &Labels) -> Option<f64> {
        let family = self.family(name)?;
        let mut matched = family.series.iter().filter(|s| s.labels.matches(filter));

        match family.kind {
            MetricKind::Counter | MetricKind::Gauge => {
                let first = matched.next()?.value.scalar()?;
                Some(matched.filter_map(|s| s.value.scalar()).fold(first, |acc, v| acc + v))
            }
            MetricKind::Histogram => {
                let (sum, count) = matched.fold((0.0, 0u64), |(sum, count), s| match &s.value {
                    SeriesValue::Histogram(h) => (sum + h.sum, count + h.count),
                    _ => (sum, count),
                });
                (count > 0).then(|| sum / count as f64)
            }
        }
    }

    /// Render in the Prometheus text exposition format.
    pub fn to_prometheus_text(&self) -> String {
        let mut out = String::new();
        for family in &self.families {
            if family.series.is_empty() {
                continue;
            }
            if !family.help.is_empty() {
                let _ = writeln!(out, "# HELP {} {}", family.name, escape_help(&family.help));
            }
            let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind);
            for series in &family.series {
                write_series(&mut out, &family.name, series);
            }
        }
        out
    }
}

fn write_series(out: &mut String, name: &str, series: &SeriesSnapshot) {
    match &series.value {
        SeriesValue::Counter { value } | SeriesValue::Gauge { value } => {
            let _ = writeln!(out, "{}{} {}", name, series.labels, format_value(*value));
        }
        SeriesValue::Histogram(h) => {
            for bucket in &h.buckets {
                let le = format_value(bucket.upper_bound);
                let _ = writeln!(
                    out,
                    "{}_bucket{} {}",
                    name,
                    series.labels.render_with(Some(("le", &le))),
                    bucket.cumulative_count
                );
            }
            let _ = writeln!(out, "{}_sum{} {}", name, series.labels, format_value(h.sum));
            let _ = writeln!(out, "{}_count{} {}", name, series.labels, h.count);
        }
    }
}

pub(crate) fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}
