//! Alert instances and the notifications sent for them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

use super::rule::{AlertRule, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    /// Firing and acknowledged alerts are open; resolved is terminal.
    #[inline]
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

/// One occurrence of a rule's condition holding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Most recent evaluated value.
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    pub tags: BTreeMap<String, String>,
}

impl Alert {
    pub(crate) fn open(rule: &AlertRule, value: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            name: rule.name.clone(),
            description: rule.description.clone(),
            severity: rule.severity,
            status: AlertStatus::Firing,
            triggered_at: now,
            acknowledged_at: None,
            resolved_at: None,
            value,
            threshold: rule.condition.threshold,
            message: describe(rule, value),
            tags: rule.tags.clone(),
        }
    }

    pub(crate) fn observe(&mut self, rule: &AlertRule, value: f64) {
        self.value = value;
        self.message = describe(rule, value);
    }

    pub(crate) fn resolve(&mut self, now: DateTime<Utc>) {
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(now);
    }
}

fn describe(rule: &AlertRule, value: f64) -> String {
    let c = &rule.condition;
    format!(
        "{}{} = {} {} {}",
        c.metric,
        c.labels,
        value,
        c.operator.symbol(),
        c.threshold
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    Triggered,
    Resolved,
}

impl AlertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triggered => "triggered",
            Self::Resolved => "resolved",
        }
    }
}

/// What a channel receives. Serializes to `{"alert": {..}, "action": ".."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub alert: Alert,
    pub action: AlertAction,
}

impl Notification {
    pub fn triggered(alert: Alert) -> Self {
        Self {
            alert,
            action: AlertAction::Triggered,
        }
    }

    pub fn resolved(alert: Alert) -> Self {
        Self {
            alert,
            action: AlertAction::Resolved,
        }
    }

    /// One-line summary, used for subjects and SMS bodies.
    pub fn title(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.status_label(),
            self.alert.severity.as_str().to_uppercase(),
            self.alert.name
        )
    }

    pub fn status_label(&self) -> &'static str {
        match self.action {
            AlertAction::Triggered => "FIRING",
            AlertAction::Resolved => "RESOLVED",
        }
    }

    /// Human-readable multi-line body shared by the text channels.
    pub fn format_message(&self) -> String {
        let alert = &self.alert;
        let status = match self.action {
            AlertAction::Triggered => "🚨 FIRING",
            AlertAction::Resolved => "✅ RESOLVED",
        };
        let time = alert.resolved_at.unwrap_or(alert.triggered_at);

        let mut out = format!("{} {}\n\n", severity_marker(alert.severity), status);
        let _ = writeln!(out, "**{}**", alert.name);
        if !alert.description.is_empty() {
            let _ = writeln!(out, "Description: {}", alert.description);
        }
        let _ = writeln!(out, "Condition: {}", alert.message);
        let _ = writeln!(out, "Value: {}", alert.value);
        let _ = writeln!(out, "Threshold: {}", alert.threshold);
        let _ = write!(
            out,
            "Time: {}",
            time.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        if !alert.tags.is_empty() {
            let tags: Vec<String> = alert.tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
            let _ = write!(out, "\nTags: {}", tags.join(", "));
        }
        out
    }
}

pub fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔴",
        Severity::Warning => "🟡",
        Severity::Info => "🔵",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::rule::{Condition, Operator};

    fn rule() -> AlertRule {
        AlertRule::new(
            "high_error_rate",
            "High Error Rate",
            Condition::new("errors_total", Operator::Gt, 5.0),
            Severity::Critical,
        )
        .description("Too many errors")
        .tag("team", "backend")
    }

    #[test]
    fn test_open_alert_copies_rule() {
        let alert = Alert::open(&rule(), 6.0, Utc::now());
        assert_eq!(alert.status, AlertStatus::Firing);
        assert_eq!(alert.rule_id, "high_error_rate");
        assert_eq!(alert.threshold, 5.0);
        assert_eq!(alert.message, "errors_total = 6 > 5");
        assert!(alert.status.is_open());
    }

    #[test]
    fn test_message_format() {
        let notification = Notification::triggered(Alert::open(&rule(), 6.0, Utc::now()));
        let text = notification.format_message();
        assert!(text.starts_with("🔴 🚨 FIRING"));
        assert!(text.contains("**High Error Rate**"));
        assert!(text.contains("Value: 6"));
        assert!(text.contains("Tags: team=backend"));
        assert_eq!(notification.title(), "[FIRING] CRITICAL: High Error Rate");
    }

    #[test]
    fn test_payload_shape() {
        let mut alert = Alert::open(&rule(), 6.0, Utc::now());
        alert.resolve(Utc::now());
        let json = serde_json::to_value(Notification::resolved(alert)).unwrap();
        assert_eq!(json["action"], "resolved");
        assert_eq!(json["alert"]["status"], "resolved");
        assert_eq!(json["alert"]["severity"], "critical");
        assert!(json["alert"]["resolved_at"].is_string());
    }
}
