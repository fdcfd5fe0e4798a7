//! Slack-style incoming webhook with color-coded attachments.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::NotificationChannel;
use crate::alerting::alert::{AlertAction, Notification};
use crate::alerting::rule::Severity;
use crate::config::SlackSettings;
use crate::error::ChannelError;

const RESOLVED_COLOR: &str = "#2e7d32";

pub fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#d32f2f",
        Severity::Warning => "#f9a825",
        Severity::Info => "#1976d2",
    }
}

#[derive(Debug)]
pub struct SlackChannel {
    id: String,
    settings: SlackSettings,
    http: reqwest::Client,
}

impl SlackChannel {
    pub fn new(id: impl Into<String>, settings: &SlackSettings, http: reqwest::Client) -> Self {
        Self {
            id: id.into(),
            settings: settings.clone(),
            http,
        }
    }

    pub(crate) fn payload(&self, notification: &Notification) -> Value {
        let alert = &notification.alert;
        let color = match notification.action {
            AlertAction::Triggered => severity_color(alert.severity),
            AlertAction::Resolved => RESOLVED_COLOR,
        };
        let mut fields = vec![
            json!({"title": "Severity", "value": alert.severity.as_str(), "short": true}),
            json!({"title": "Value", "value": alert.value.to_string(), "short": true}),
            json!({"title": "Threshold", "value": alert.threshold.to_string(), "short": true}),
            json!({"title": "Rule", "value": alert.rule_id, "short": true}),
        ];
        for (k, v) in &alert.tags {
            fields.push(json!({"title": k, "value": v, "short": true}));
        }

        let mut payload = json!({
            "text": notification.title(),
            "attachments": [{
                "color": color,
                "title": alert.name,
                "text": notification.format_message(),
                "fields": fields,
                "ts": alert.resolved_at.unwrap_or(alert.triggered_at).timestamp(),
            }],
        });
        if let Some(obj) = payload.as_object_mut() {
            for (key, value) in [
                ("channel", &self.settings.channel),
                ("username", &self.settings.username),
                ("icon_emoji", &self.settings.icon_emoji),
            ] {
                if let Some(value) = value {
                    obj.insert(key.to_string(), Value::String(value.clone()));
                }
            }
        }
        payload
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
        let response = self
            .http
            .post(&self.settings.webhook_url)
            .json(&self.payload(notification))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Status(status.as_u16()));
        }
        Ok(())
    }
}
