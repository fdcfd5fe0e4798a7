//! Channel that only writes to the log.

use async_trait::async_trait;
use tracing::{info, warn};

use super::NotificationChannel;
use crate::alerting::alert::{AlertAction, Notification};
use crate::error::ChannelError;

#[derive(Debug)]
pub struct LogChannel {
    id: String,
}

impl LogChannel {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
        let alert = &notification.alert;
        match notification.action {
            AlertAction::Triggered => warn!(
                channel = %self.id,
                alert = %alert.id,
                rule = %alert.rule_id,
                severity = %alert.severity,
                value = alert.value,
                "{}",
                notification.format_message()
            ),
            AlertAction::Resolved => info!(
                channel = %self.id,
                alert = %alert.id,
                rule = %alert.rule_id,
                "{}",
                notification.format_message()
            ),
        }
        Ok(())
    }
}
