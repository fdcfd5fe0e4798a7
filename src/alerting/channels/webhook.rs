//! Generic JSON webhook.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::NotificationChannel;
use crate::alerting::alert::Notification;
use crate::config::WebhookSettings;
use crate::error::ChannelError;

/// POSTs `{"alert": .., "action": "triggered" | "resolved"}` to a URL.
#[derive(Debug)]
pub struct WebhookChannel {
    id: String,
    url: String,
    headers: HeaderMap,
    http: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(
        id: impl Into<String>,
        settings: &WebhookSettings,
        http: reqwest::Client,
    ) -> Result<Self, ChannelError> {
        let id = id.into();
        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ChannelError::Misconfigured(format!("{id}: invalid header name {name:?}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ChannelError::Misconfigured(format!("{id}: invalid value for header {name}")))?;
            headers.insert(name, value);
        }
        Ok(Self {
            id,
            url: settings.url.clone(),
            headers,
            http,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
        let response = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .json(notification)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_invalid_header_is_misconfigured() {
        let settings = WebhookSettings {
            url: "http://localhost/hook".into(),
            headers: BTreeMap::from([("bad header".to_string(), "x".to_string())]),
        };
        let err = WebhookChannel::new("hook", &settings, reqwest::Client::new()).unwrap_err();
        assert_eq!(err.error_code(), "misconfigured");
    }
}
