//! Notification channels and concurrent dispatch.
//!
//! The evaluator only knows the [`NotificationChannel`] contract. Concrete
//! transports live in the submodules and are built from configuration by
//! [`build_channel`].
//!
//! Delivery is best-effort: `dispatch` sends to every listed channel
//! concurrently, bounds each send by the dispatch timeout, and reports
//! failures without letting one channel hold up the others.

mod email;
mod log;
mod slack;
mod sms;
mod webhook;

pub use email::EmailChannel;
pub use log::LogChannel;
pub use slack::SlackChannel;
pub use sms::SmsChannel;
pub use webhook::WebhookChannel;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};

use super::alert::Notification;
use crate::config::{AlertingConfig, ChannelConfig, ChannelSettings};
use crate::error::ChannelError;
use crate::metrics::InternalMetrics;
use crate::telemetry::spans;

/// A destination for alert notifications.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Id referenced by rules.
    fn id(&self) -> &str;

    /// Transport name (`webhook`, `slack`, ...).
    fn kind(&self) -> &'static str;

    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> Result<(), ChannelError>;
}

/// Build a channel from its configuration block.
pub fn build_channel(
    config: &ChannelConfig,
    http: &reqwest::Client,
) -> Result<Arc<dyn NotificationChannel>, ChannelError> {
    let id = config.id.clone();
    Ok(match &config.settings {
        ChannelSettings::Webhook(settings) => {
            Arc::new(WebhookChannel::new(id, settings, http.clone())?)
        }
        ChannelSettings::Slack(settings) => Arc::new(SlackChannel::new(id, settings, http.clone())),
        ChannelSettings::Email(settings) => Arc::new(EmailChannel::new(id, settings)?),
        ChannelSettings::Sms(settings) => Arc::new(SmsChannel::new(id, settings, http.clone())?),
        ChannelSettings::Log => Arc::new(LogChannel::new(id)),
    })
}

struct Slot {
    channel: Arc<dyn NotificationChannel>,
    enabled: AtomicBool,
    limiter: Option<DefaultDirectRateLimiter>,
}

/// Outcome of one `dispatch` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    /// `(channel id, error code)`
    pub failed: Vec<(String, String)>,
    /// Unknown or disabled ids.
    pub skipped: Vec<String>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Channel summary for the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub id: String,
    pub kind: &'static str,
    pub enabled: bool,
}

/// Channels by id, with per-channel enable flag and optional rate cap.
pub struct ChannelRegistry {
    slots: DashMap<String, Arc<Slot>>,
    timeout: Duration,
    metrics: Arc<InternalMetrics>,
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.slots.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ChannelRegistry {
    pub fn new(timeout: Duration, metrics: Arc<InternalMetrics>) -> Self {
        Self {
            slots: DashMap::new(),
            timeout,
            metrics,
        }
    }

    /// Build every configured channel.
    pub fn from_config(
        config: &AlertingConfig,
        metrics: Arc<InternalMetrics>,
    ) -> Result<Self, ChannelError> {
        let registry = Self::new(config.dispatch_timeout(), metrics);
        let http = reqwest::Client::builder()
            .timeout(config.dispatch_timeout())
            .build()?;
        for channel_config in &config.channels {
            let channel = build_channel(channel_config, &http)?;
            registry.add_with(channel, channel_config.enabled, channel_config.max_per_minute);
            info!(
                channel = %channel_config.id,
                name = %channel_config.display_name(),
                enabled = channel_config.enabled,
                "Notification channel registered"
            );
        }
        Ok(registry)
    }

    /// Add (or replace) an enabled, unlimited channel.
    pub fn add(&self, channel: Arc<dyn NotificationChannel>) {
        self.add_with(channel, true, None);
    }

    /// Add (or replace) a channel. `max_per_minute` of `None` or zero means
    /// unlimited.
    pub fn add_with(
        &self,
        channel: Arc<dyn NotificationChannel>,
        enabled: bool,
        max_per_minute: Option<u32>,
    ) {
        let limiter = max_per_minute
            .and_then(NonZeroU32::new)
            .map(|rate| RateLimiter::direct(Quota::per_minute(rate)));
        let id = channel.id().to_string();
        self.slots.insert(
            id,
            Arc::new(Slot {
                channel,
                enabled: AtomicBool::new(enabled),
                limiter,
            }),
        );
    }

    pub fn remove(&self, id: &str) -> bool {
        self.slots.remove(id).is_some()
    }

    /// Returns false for an unknown id.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        match self.slots.get(id) {
            Some(slot) => {
                slot.enabled.store(enabled, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn list(&self) -> Vec<ChannelInfo> {
        let mut channels: Vec<ChannelInfo> = self
            .slots
            .iter()
            .map(|entry| ChannelInfo {
                id: entry.key().clone(),
                kind: entry.channel.kind(),
                enabled: entry.enabled.load(Ordering::Relaxed),
            })
            .collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        channels
    }

    /// Send `notification` to each channel in `ids` concurrently.
    ///
    /// Never fails: unknown and disabled ids are skipped, delivery errors
    /// and timeouts are logged, counted and reported.
    pub async fn dispatch(&self, notification: &Notification, ids: &[String]) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut targets = Vec::with_capacity(ids.len());

        for id in ids {
            // Clone the slot out so no map guard is held across the sends.
            let slot = self.slots.get(id.as_str()).map(|s| Arc::clone(s.value()));
            match slot {
                None => {
                    warn!(channel = %id, alert = %notification.alert.id, "Unknown notification channel, skipping");
                    report.skipped.push(id.clone());
                }
                Some(slot) if !slot.enabled.load(Ordering::Relaxed) => {
                    debug!(channel = %id, "Notification channel disabled, skipping");
                    report.skipped.push(id.clone());
                }
                Some(slot) => targets.push((id.clone(), slot)),
            }
        }

        let sends = targets.into_iter().map(|(id, slot)| {
            let span = spans::dispatch(&id, slot.channel.kind(), notification.action.as_str());
            async move {
                let started = Instant::now();
                let result = self.send_one(&id, &slot, notification).await;
                (id, started.elapsed(), result)
            }
            .instrument(span)
        });

        for (id, elapsed, result) in join_all(sends).await {
            let secs = elapsed.as_secs_f64();
            match result {
                Ok(()) => {
                    debug!(channel = %id, elapsed_ms = elapsed.as_millis() as u64, "Notification delivered");
                    self.metrics.record_notification(&id, secs, None);
                    report.delivered.push(id);
                }
                Err(e) => {
                    warn!(channel = %id, alert = %notification.alert.id, error = %e, "Notification delivery failed");
                    self.metrics.record_notification(&id, secs, Some(e.error_code()));
                    report.failed.push((id, e.error_code().to_string()));
                }
            }
        }
        report
    }

    async fn send_one(
        &self,
        id: &str,
        slot: &Slot,
        notification: &Notification,
    ) -> Result<(), ChannelError> {
        if let Some(limiter) = &slot.limiter {
            if limiter.check().is_err() {
                return Err(ChannelError::RateLimited(id.to_string()));
            }
        }
        match tokio::time::timeout(self.timeout, slot.channel.send(notification)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::alert::Alert;
    use crate::alerting::rule::{AlertRule, Condition, Operator, Severity};
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        id: String,
        sent: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl NotificationChannel for Counting {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> &'static str {
            "test"
        }

        async fn send(&self, _notification: &Notification) -> Result<(), ChannelError> {
            tokio::time::sleep(self.delay).await;
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting(id: &str, delay: Duration) -> Arc<Counting> {
        Arc::new(Counting {
            id: id.to_string(),
            sent: AtomicUsize::new(0),
            delay,
        })
    }

    fn notification() -> Notification {
        let rule = AlertRule::new("r", "R", Condition::new("m", Operator::Gt, 1.0), Severity::Info);
        Notification::triggered(Alert::open(&rule, 2.0, Utc::now()))
    }

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(
            Duration::from_secs(5),
            Arc::new(InternalMetrics::new().unwrap()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_channel_times_out_without_blocking_others() {
        let registry = registry();
        let fast = counting("fast", Duration::from_millis(10));
        let hung = counting("hung", Duration::from_secs(3600));
        registry.add(fast.clone());
        registry.add(hung.clone());

        let report = registry
            .dispatch(&notification(), &["hung".into(), "fast".into()])
            .await;
        assert_eq!(report.delivered, ["fast"]);
        assert_eq!(report.failed, [("hung".to_string(), "timeout".to_string())]);
        assert_eq!(fast.sent.load(Ordering::SeqCst), 1);
        assert_eq!(hung.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_and_disabled_are_skipped() {
        let registry = registry();
        let a = counting("a", Duration::ZERO);
        registry.add(a.clone());
        registry.add(counting("b", Duration::ZERO));
        assert!(registry.set_enabled("b", false));
        assert!(!registry.set_enabled("zzz", false));

        let report = registry
            .dispatch(&notification(), &["a".into(), "b".into(), "zzz".into()])
            .await;
        assert_eq!(report.delivered, ["a"]);
        assert_eq!(report.skipped, ["b", "zzz"]);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_rate_cap() {
        let registry = registry();
        let a = counting("a", Duration::ZERO);
        registry.add_with(a.clone(), true, Some(1));

        let ids = ["a".to_string()];
        let first = registry.dispatch(&notification(), &ids).await;
        let second = registry.dispatch(&notification(), &ids).await;
        assert_eq!(first.delivered, ["a"]);
        assert_eq!(second.failed, [("a".to_string(), "rate_limited".to_string())]);
        assert_eq!(a.sent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = registry();
        registry.add(counting("b", Duration::ZERO));
        registry.add(counting("a", Duration::ZERO));
        let ids: Vec<_> = registry.list().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(registry.remove("a"));
        assert_eq!(registry.len(), 1);
    }
}
