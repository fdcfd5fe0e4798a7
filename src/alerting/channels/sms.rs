//! SMS through a Twilio-compatible REST API.

use async_trait::async_trait;

use super::NotificationChannel;
use crate::alerting::alert::Notification;
use crate::config::SmsSettings;
use crate::error::ChannelError;

/// Longest body sent; providers split or reject beyond this.
const MAX_BODY_CHARS: usize = 320;

#[derive(Debug)]
pub struct SmsChannel {
    id: String,
    settings: SmsSettings,
    endpoint: String,
    http: reqwest::Client,
}

impl SmsChannel {
    pub fn new(
        id: impl Into<String>,
        settings: &SmsSettings,
        http: reqwest::Client,
    ) -> Result<Self, ChannelError> {
        let id = id.into();
        if settings.to.is_empty() {
            return Err(ChannelError::Misconfigured(format!("{id}: no recipients")));
        }
        let endpoint = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            settings.api_base.trim_end_matches('/'),
            settings.account_sid
        );
        Ok(Self {
            id,
            settings: settings.clone(),
            endpoint,
            http,
        })
    }

    pub(crate) fn body(notification: &Notification) -> String {
        let alert = &notification.alert;
        let body = format!(
            "{} value={} threshold={}",
            notification.title(),
            alert.value,
            alert.threshold
        );
        body.chars().take(MAX_BODY_CHARS).collect()
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "sms"
    }

    async fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
        let body = Self::body(notification);
        for to in &self.settings.to {
            let response = self
                .http
                .post(&self.endpoint)
                .basic_auth(&self.settings.account_sid, Some(&self.settings.auth_token))
                .form(&[
                    ("To", to.as_str()),
                    ("From", self.settings.from.as_str()),
                    ("Body", body.as_str()),
                ])
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ChannelError::Status(status.as_u16()));
            }
        }
        Ok(())
    }
}
