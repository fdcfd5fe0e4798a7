//! Test notification channels.

use async_trait::async_trait;
use parking_lot::Mutex;
use pulsewatch::alerting::{AlertAction, Notification, NotificationChannel};
use pulsewatch::error::ChannelError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Records every notification it receives.
pub struct RecordingChannel {
    id: String,
    received: Mutex<Vec<Notification>>,
}

#[allow(dead_code)]
impl RecordingChannel {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().clone()
    }

    pub fn count(&self, action: AlertAction) -> usize {
        self.received
            .lock()
            .iter()
            .filter(|n| n.action == action)
            .count()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
        self.received.lock().push(notification.clone());
        Ok(())
    }
}

/// Always fails with a 500 status.
pub struct FailingChannel {
    id: String,
    attempts: AtomicUsize,
}

#[allow(dead_code)]
impl FailingChannel {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for FailingChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "failing"
    }

    async fn send(&self, _notification: &Notification) -> Result<(), ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ChannelError::Status(500))
    }
}
