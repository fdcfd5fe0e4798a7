//! Alerting configuration: evaluator settings, rules and channels.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::types::default_true;
use crate::alerting::{Aggregation, AlertRule, Condition, Operator, Severity};
use crate::error::RuleError;
use crate::registry::Labels;

/// What `register_rule` does with a channel id nobody registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownChannelPolicy {
    /// Reject the rule with `RuleError::UnknownChannel`.
    #[default]
    Reject,
    /// Accept the rule, log a warning; dispatch skips the id.
    Warn,
}

/// Alert evaluator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertingConfig {
    /// Seconds between evaluation passes (default: 30).
    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,
    /// Per-channel delivery timeout in seconds (default: 5).
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
    /// Handling of unknown channel ids in rules (default: reject).
    #[serde(default)]
    pub unknown_channel: UnknownChannelPolicy,
    /// Resolved alerts kept for inspection (default: 1000).
    #[serde(default = "default_max_alert_history")]
    pub max_alert_history: usize,
    /// Install the built-in rule set at startup (default: false).
    #[serde(default)]
    pub default_rules: bool,
    /// Notification channels.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    /// Alert rules, evaluated in this order.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: default_evaluation_interval_secs(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            unknown_channel: UnknownChannelPolicy::default(),
            max_alert_history: default_max_alert_history(),
            default_rules: false,
            channels: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl AlertingConfig {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

fn default_evaluation_interval_secs() -> u64 {
    30
}

fn default_dispatch_timeout_secs() -> u64 {
    5
}

fn default_max_alert_history() -> usize {
    1000
}

/// A notification channel block (`[[alerting.channels]]`).
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Id referenced by rules.
    pub id: String,
    /// Display name (defaults to the id).
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Deliveries allowed per minute; unlimited when absent.
    pub max_per_minute: Option<u32>,
    #[serde(flatten)]
    pub settings: ChannelSettings,
}

impl ChannelConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Channel transport, selected by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChannelSettings {
    Email(EmailSettings),
    Webhook(WebhookSettings),
    Slack(SlackSettings),
    Sms(SmsSettings),
    /// Writes notifications to the log only.
    Log,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailSettings {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Use STARTTLS (default: true).
    #[serde(default = "default_true")]
    pub secure: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    pub url: String,
    /// Extra request headers (e.g. Authorization).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackSettings {
    pub webhook_url: String,
    pub channel: Option<String>,
    pub username: Option<String>,
    pub icon_emoji: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
    pub to: Vec<String>,
    /// Provider API base URL (default: https://api.twilio.com).
    #[serde(default = "default_sms_api_base")]
    pub api_base: String,
}

fn default_sms_api_base() -> String {
    "https://api.twilio.com".to_string()
}

/// An alert rule block (`[[alerting.rules]]`).
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub metric: String,
    /// Only series carrying these labels contribute to the value.
    #[serde(default)]
    pub labels: Labels,
    pub operator: Operator,
    pub threshold: f64,
    /// Aggregation window in seconds (default: 0, current sample only).
    #[serde(default)]
    pub window_secs: u64,
    pub aggregation: Option<Aggregation>,
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum seconds between trigger notifications (default: 300).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_cooldown_secs() -> i64 {
    300
}

impl RuleConfig {
    /// Convert into a rule, rejecting a negative cooldown.
    pub fn into_rule(self) -> Result<AlertRule, RuleError> {
        let cooldown = u64::try_from(self.cooldown_secs)
            .map(Duration::from_secs)
            .map_err(|_| RuleError::InvalidCooldown(self.id.clone()))?;
        Ok(AlertRule {
            id: self.id,
            name: self.name,
            description: self.description,
            condition: Condition {
                metric: self.metric,
                labels: self.labels,
                operator: self.operator,
                threshold: self.threshold,
                window: Duration::from_secs(self.window_secs),
                aggregation: self.aggregation,
            },
            severity: self.severity,
            enabled: self.enabled,
            cooldown,
            notification_channels: self.channels,
            tags: self.tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_kinds_parse() {
        let toml = r#"
[[channels]]
id = "ops-hook"
kind = "webhook"
url = "http://localhost:9000/hook"
headers = { Authorization = "Bearer t" }

[[channels]]
id = "chat"
kind = "slack"
webhook_url = "http://localhost:9000/slack"
max_per_minute = 10

[[channels]]
id = "audit"
kind = "log"
enabled = false
"#;
        let config: AlertingConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.channels.len(), 3);
        assert!(matches!(
            &config.channels[0].settings,
            ChannelSettings::Webhook(w) if w.headers["Authorization"] == "Bearer t"
        ));
        assert_eq!(config.channels[1].max_per_minute, Some(10));
        assert!(matches!(config.channels[2].settings, ChannelSettings::Log));
        assert!(!config.channels[2].enabled);
        assert_eq!(config.channels[2].display_name(), "audit");
    }

    #[test]
    fn test_rule_conversion() {
        let toml = r#"
[[rules]]
id = "high_error_rate"
name = "High Error Rate"
metric = "errors_total"
labels = { service = "api" }
operator = "gt"
threshold = 5
severity = "critical"
aggregation = "avg"
window_secs = 300
channels = ["chat"]
"#;
        let config: AlertingConfig = toml::from_str(toml).unwrap();
        let rule = config.rules[0].clone().into_rule().unwrap();
        assert_eq!(rule.condition.threshold, 5.0);
        assert_eq!(rule.condition.operator, Operator::Gt);
        assert_eq!(rule.condition.window, Duration::from_secs(300));
        assert_eq!(rule.cooldown, Duration::from_secs(300));
        assert_eq!(rule.condition.labels.get("service"), Some("api"));
        assert!(rule.enabled);
    }

    #[test]
    fn test_negative_cooldown_rejected() {
        let toml = r#"
[[rules]]
id = "r"
name = "R"
metric = "m"
operator = "lt"
threshold = 1.0
severity = "info"
cooldown_secs = -5
"#;
        let config: AlertingConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.rules[0].clone().into_rule().unwrap_err(),
            RuleError::InvalidCooldown("r".into())
        );
    }
}
