//! Alert rules: structured threshold predicates over registry metrics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::RuleError;
use crate::registry::Labels;

/// Comparison applied as `value <op> threshold`.
///
/// Plain IEEE-754 comparison; `Eq`/`Ne` are exact with no tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl Operator {
    #[inline]
    pub fn apply(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

/// Reduction over the samples collected inside a rule's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Avg,
    Sum,
    Min,
    Max,
    Count,
}

impl Aggregation {
    /// Reduce `samples`; `None` for an empty window.
    pub fn apply(self, samples: impl Iterator<Item = f64>) -> Option<f64> {
        let (n, sum, min, max) = samples.fold(
            (0usize, 0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(n, sum, min, max), v| (n + 1, sum + v, min.min(v), max.max(v)),
        );
        if n == 0 {
            return None;
        }
        Some(match self {
            Self::Avg => sum / n as f64,
            Self::Sum => sum,
            Self::Min => min,
            Self::Max => max,
            Self::Count => n as f64,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `aggregation(metric{labels} over window) <operator> threshold`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub metric: String,
    /// Series filter; empty matches every series of `metric`.
    pub labels: Labels,
    pub operator: Operator,
    pub threshold: f64,
    /// How far back samples are kept for `aggregation`. Zero keeps only the
    /// current sample.
    #[serde(with = "duration_secs")]
    pub window: Duration,
    /// `None` evaluates the most recent sample.
    pub aggregation: Option<Aggregation>,
}

impl Condition {
    pub fn new(metric: impl Into<String>, operator: Operator, threshold: f64) -> Self {
        Self {
            metric: metric.into(),
            labels: Labels::new(),
            operator,
            threshold,
            window: Duration::ZERO,
            aggregation: None,
        }
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn aggregated(mut self, aggregation: Aggregation, window: Duration) -> Self {
        self.aggregation = Some(aggregation);
        self.window = window;
        self
    }

    #[inline]
    pub fn holds(&self, value: f64) -> bool {
        self.operator.apply(value, self.threshold)
    }
}

/// A named, cooldown-gated condition routed to notification channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub condition: Condition,
    pub severity: Severity,
    pub enabled: bool,
    /// Minimum time between two trigger notifications.
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
    /// Channel ids, in dispatch order.
    pub notification_channels: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

impl AlertRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        condition: Condition,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            condition,
            severity,
            enabled: true,
            cooldown: Duration::from_secs(300),
            notification_channels: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.notification_channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Checks that do not depend on the channel registry.
    pub fn validate(&self) -> Result<(), RuleError> {
        if !self.condition.threshold.is_finite() {
            return Err(RuleError::NonFiniteThreshold(self.id.clone()));
        }
        Ok(())
    }
}

/// The built-in rule set installed by `alerting.default_rules = true`.
///
/// Channel ids refer to the conventional `email`, `slack` and `sms`
/// channels; unknown ids follow `alerting.unknown_channel`.
pub fn default_rules() -> Vec<AlertRule> {
    let five_minutes = Duration::from_secs(300);
    vec![
        AlertRule::new(
            "high_error_rate",
            "High Error Rate",
            Condition::new("errors_total", Operator::Gt, 5.0)
                .aggregated(Aggregation::Avg, five_minutes),
            Severity::Critical,
        )
        .description("Error rate exceeds 5%")
        .channels(["email", "slack"])
        .tag("type", "error"),
        AlertRule::new(
            "high_response_time",
            "High Response Time",
            Condition::new("http_request_duration_seconds", Operator::Gt, 2.0)
                .aggregated(Aggregation::Avg, five_minutes),
            Severity::Warning,
        )
        .description("Average response time exceeds 2 seconds")
        .cooldown(Duration::from_secs(600))
        .channels(["slack"])
        .tag("type", "performance"),
        AlertRule::new(
            "high_memory_usage",
            "High Memory Usage",
            Condition::new("memory_usage_percent", Operator::Gt, 80.0)
                .aggregated(Aggregation::Avg, Duration::from_secs(600)),
            Severity::Warning,
        )
        .description("Memory usage exceeds 80%")
        .cooldown(Duration::from_secs(900))
        .channels(["email"])
        .tag("type", "resource"),
        AlertRule::new(
            "database_connection_issues",
            "Database Connection Issues",
            Condition::new("database_connection_errors", Operator::Gt, 0.0)
                .aggregated(Aggregation::Sum, Duration::from_secs(60)),
            Severity::Critical,
        )
        .description("Database connection failures detected")
        .channels(["email", "slack", "sms"])
        .tag("type", "database"),
        AlertRule::new(
            "low_disk_space",
            "Low Disk Space",
            Condition::new("disk_usage_percent", Operator::Gt, 90.0)
                .aggregated(Aggregation::Avg, five_minutes),
            Severity::Critical,
        )
        .description("Disk space usage exceeds 90%")
        .cooldown(Duration::from_secs(1800))
        .channels(["email", "slack"])
        .tag("type", "resource"),
    ]
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operators_are_exact() {
        assert!(Operator::Gt.apply(6.0, 5.0));
        assert!(!Operator::Gt.apply(5.0, 5.0));
        assert!(Operator::Gte.apply(5.0, 5.0));
        assert!(Operator::Lte.apply(-1.0, 0.0));
        assert!(!Operator::Eq.apply(0.1 + 0.2, 0.3));
        assert!(Operator::Ne.apply(0.1 + 0.2, 0.3));
        assert!(!Operator::Gt.apply(f64::NAN, 0.0));
    }

    #[test]
    fn test_aggregations() {
        let samples = [3.0, 6.0, 9.0];
        assert_eq!(Aggregation::Avg.apply(samples.into_iter()), Some(6.0));
        assert_eq!(Aggregation::Sum.apply(samples.into_iter()), Some(18.0));
        assert_eq!(Aggregation::Min.apply(samples.into_iter()), Some(3.0));
        assert_eq!(Aggregation::Max.apply(samples.into_iter()), Some(9.0));
        assert_eq!(Aggregation::Count.apply(samples.into_iter()), Some(3.0));
        assert_eq!(Aggregation::Avg.apply(std::iter::empty()), None);
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let rule = AlertRule::new("r", "R", Condition::new("m", Operator::Gt, f64::NAN), Severity::Info);
        assert_eq!(rule.validate(), Err(RuleError::NonFiniteThreshold("r".into())));
    }

    #[test]
    fn test_default_rules() {
        let rules = default_rules();
        assert_eq!(rules.len(), 5);
        assert!(rules.iter().all(|r| r.validate().is_ok()));
        let db = rules.iter().find(|r| r.id == "database_connection_issues").unwrap();
        assert_eq!(db.notification_channels, ["email", "slack", "sms"]);
        assert_eq!(db.condition.aggregation, Some(Aggregation::Sum));
    }

    #[test]
    fn test_severity_orders_by_urgency() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
