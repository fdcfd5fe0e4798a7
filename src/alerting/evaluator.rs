//! Rule evaluation and alert lifecycle.
//!
//! # Architecture
//!
//! An evaluation pass runs in two phases:
//!
//! 1. Under the state lock, every enabled rule is sampled from one registry
//!    snapshot and its alert state advanced. State changes that need a
//!    notification are collected as jobs.
//! 2. With the lock released, all jobs are dispatched concurrently through
//!    the [`ChannelRegistry`].
//!
//! Per rule: the condition is checked on every pass, and the cooldown only
//! gates trigger notifications. A firing rule is re-notified once its
//! cooldown has elapsed; resolution is never delayed by the cooldown.

use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, warn};

use super::alert::{Alert, AlertStatus, Notification};
use super::channels::{ChannelRegistry, DispatchReport};
use super::rule::{AlertRule, default_rules};
use crate::config::{AlertingConfig, UnknownChannelPolicy};
use crate::error::{AlertError, EvaluationError, RuleError};
use crate::metrics::InternalMetrics;
use crate::registry::{MetricRegistry, RegistrySnapshot};
use crate::telemetry::{EvaluationTimer, spans};

#[derive(Debug)]
struct RuleState {
    rule: AlertRule,
    last_triggered_at: Option<Instant>,
    open_alert: Option<String>,
    samples: VecDeque<(Instant, f64)>,
}

impl RuleState {
    fn new(rule: AlertRule) -> Self {
        Self {
            rule,
            last_triggered_at: None,
            open_alert: None,
            samples: VecDeque::new(),
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.last_triggered_at
            .is_none_or(|last| now.saturating_duration_since(last) >= self.rule.cooldown)
    }

    /// Record the current value and reduce the window.
    ///
    /// `Ok(None)` when the metric is absent.
    fn sample(
        &mut self,
        snapshot: &RegistrySnapshot,
        now: Instant,
    ) -> Result<Option<f64>, EvaluationError> {
        let condition = &self.rule.condition;
        let Some(current) = snapshot.value_of(&condition.metric, &condition.labels) else {
            return Ok(None);
        };
        check_finite(&condition.metric, current)?;

        self.samples.push_back((now, current));
        let window = condition.window;
        while let Some(&(at, _)) = self.samples.front() {
            let stale = now.saturating_duration_since(at) > window;
            if stale || (window.is_zero() && self.samples.len() > 1) {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        let value = match condition.aggregation {
            None => current,
            Some(aggregation) => aggregation
                .apply(self.samples.iter().map(|&(_, v)| v))
                .unwrap_or(current),
        };
        check_finite(&condition.metric, value)?;
        Ok(Some(value))
    }
}

fn check_finite(metric: &str, value: f64) -> Result<(), EvaluationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EvaluationError::NonFiniteValue {
            metric: metric.to_string(),
            value,
        })
    }
}

#[derive(Debug, Default)]
struct State {
    /// Registration order is evaluation order.
    rules: Vec<RuleState>,
    alerts: HashMap<String, Alert>,
    /// Resolved alert ids, oldest first.
    resolved: VecDeque<String>,
}

impl State {
    fn rule_mut(&mut self, id: &str) -> Option<&mut RuleState> {
        self.rules.iter_mut().find(|r| r.rule.id == id)
    }

    fn open_alerts(&self) -> usize {
        self.alerts.values().filter(|a| a.status.is_open()).count()
    }

    fn push_resolved(&mut self, id: String, max_history: usize) {
        self.resolved.push_back(id);
        while self.resolved.len() > max_history {
            if let Some(old) = self.resolved.pop_front() {
                self.alerts.remove(&old);
            }
        }
    }
}

/// A notification produced by phase one, sent in phase two.
struct Job {
    notification: Notification,
    channels: Vec<String>,
}

/// Summary of one `evaluate_all` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    pub evaluated: usize,
    pub triggered: usize,
    pub resolved: usize,
    pub errors: usize,
    pub dispatch_failures: usize,
}

/// Counts for the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertingStatus {
    pub rules: usize,
    pub enabled_rules: usize,
    pub active_alerts: usize,
    pub channels: usize,
}

/// Evaluates rules against the metric registry and owns alert state.
#[derive(Debug)]
pub struct AlertEvaluator {
    registry: Arc<MetricRegistry>,
    channels: Arc<ChannelRegistry>,
    metrics: Arc<InternalMetrics>,
    unknown_channel: UnknownChannelPolicy,
    max_alert_history: usize,
    state: Mutex<State>,
}

impl AlertEvaluator {
    pub fn new(
        registry: Arc<MetricRegistry>,
        channels: Arc<ChannelRegistry>,
        metrics: Arc<InternalMetrics>,
        config: &AlertingConfig,
    ) -> Self {
        Self {
            registry,
            channels,
            metrics,
            unknown_channel: config.unknown_channel,
            max_alert_history: config.max_alert_history,
            state: Mutex::new(State::default()),
        }
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    /// Install the built-in rules (when enabled) and the configured rules.
    ///
    /// Built-in rules drop channel ids that are not registered. A configured
    /// rule with the id of a built-in one replaces it.
    pub fn install_rules(&self, config: &AlertingConfig) -> Result<usize, RuleError> {
        let mut installed = 0;
        if config.default_rules {
            for mut rule in default_rules() {
                rule.notification_channels.retain(|id| {
                    let known = self.channels.contains(id);
                    if !known {
                        debug!(rule = %rule.id, channel = %id, "Built-in rule channel not configured, dropping");
                    }
                    known
                });
                self.register_rule(rule)?;
                installed += 1;
            }
        }
        for rule_config in &config.rules {
            let rule = rule_config.clone().into_rule()?;
            if self.rule(&rule.id).is_some() {
                self.update_rule(rule)?;
            } else {
                self.register_rule(rule)?;
                installed += 1;
            }
        }
        Ok(installed)
    }

    fn check_rule(&self, rule: &AlertRule) -> Result<(), RuleError> {
        rule.validate()?;
        for channel in &rule.notification_channels {
            if self.channels.contains(channel) {
                continue;
            }
            match self.unknown_channel {
                UnknownChannelPolicy::Reject => {
                    return Err(RuleError::UnknownChannel {
                        rule: rule.id.clone(),
                        channel: channel.clone(),
                    });
                }
                UnknownChannelPolicy::Warn => {
                    warn!(rule = %rule.id, channel = %channel, "Rule references unknown channel; it will be skipped");
                }
            }
        }
        Ok(())
    }

    pub fn register_rule(&self, rule: AlertRule) -> Result<(), RuleError> {
        self.check_rule(&rule)?;
        let mut state = self.state.lock();
        if state.rules.iter().any(|r| r.rule.id == rule.id) {
            return Err(RuleError::DuplicateRule(rule.id));
        }
        info!(rule = %rule.id, metric = %rule.condition.metric, severity = %rule.severity, "Alert rule registered");
        state.rules.push(RuleState::new(rule));
        Ok(())
    }

    /// Replace a rule's definition. Cooldown bookkeeping and any open alert
    /// are kept; collected samples are dropped if the condition changed.
    pub fn update_rule(&self, rule: AlertRule) -> Result<(), RuleError> {
        self.check_rule(&rule)?;
        let mut state = self.state.lock();
        let slot = state
            .rule_mut(&rule.id)
            .ok_or_else(|| RuleError::UnknownRule(rule.id.clone()))?;
        if slot.rule.condition != rule.condition {
            slot.samples.clear();
        }
        debug!(rule = %rule.id, "Alert rule updated");
        slot.rule = rule;
        Ok(())
    }

    /// Remove a rule. An open alert for it is resolved without notification.
    pub fn remove_rule(&self, id: &str) -> Result<AlertRule, RuleError> {
        let mut state = self.state.lock();
        let idx = state
            .rules
            .iter()
            .position(|r| r.rule.id == id)
            .ok_or_else(|| RuleError::UnknownRule(id.to_string()))?;
        let removed = state.rules.remove(idx);
        if let Some(alert_id) = removed.open_alert {
            if let Some(alert) = state.alerts.get_mut(&alert_id) {
                alert.resolve(Utc::now());
            }
            state.push_resolved(alert_id, self.max_alert_history);
        }
        self.metrics.active_alerts.set(state.open_alerts() as i64);
        info!(rule = %id, "Alert rule removed");
        Ok(removed.rule)
    }

    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> Result<(), RuleError> {
        let mut state = self.state.lock();
        let slot = state
            .rule_mut(id)
            .ok_or_else(|| RuleError::UnknownRule(id.to_string()))?;
        slot.rule.enabled = enabled;
        Ok(())
    }

    pub fn rule(&self, id: &str) -> Option<AlertRule> {
        let state = self.state.lock();
        state
            .rules
            .iter()
            .find(|r| r.rule.id == id)
            .map(|r| r.rule.clone())
    }

    /// All rules in evaluation order.
    pub fn rules(&self) -> Vec<AlertRule> {
        self.state.lock().rules.iter().map(|r| r.rule.clone()).collect()
    }

    /// Firing and acknowledged alerts, oldest first.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.collect_alerts(|a| a.status.is_open())
    }

    /// Every retained alert, oldest first.
    pub fn all_alerts(&self) -> Vec<Alert> {
        self.collect_alerts(|_| true)
    }

    fn collect_alerts(&self, keep: impl Fn(&Alert) -> bool) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .state
            .lock()
            .alerts
            .values()
            .filter(|a| keep(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| a.triggered_at.cmp(&b.triggered_at).then_with(|| a.id.cmp(&b.id)));
        alerts
    }

    pub fn alert(&self, id: &str) -> Option<Alert> {
        self.state.lock().alerts.get(id).cloned()
    }

    pub fn status(&self) -> AlertingStatus {
        let state = self.state.lock();
        AlertingStatus {
            rules: state.rules.len(),
            enabled_rules: state.rules.iter().filter(|r| r.rule.enabled).count(),
            active_alerts: state.open_alerts(),
            channels: self.channels.len(),
        }
    }

    /// Move a firing alert to acknowledged.
    ///
    /// Acknowledging twice is a no-op. Later evaluations still resolve it.
    pub fn acknowledge_alert(&self, id: &str) -> Result<Alert, AlertError> {
        let mut state = self.state.lock();
        let alert = state
            .alerts
            .get_mut(id)
            .ok_or_else(|| AlertError::UnknownAlert(id.to_string()))?;
        match alert.status {
            AlertStatus::Resolved => Err(AlertError::AlreadyResolved(id.to_string())),
            AlertStatus::Acknowledged => Ok(alert.clone()),
            AlertStatus::Firing => {
                alert.status = AlertStatus::Acknowledged;
                alert.acknowledged_at = Some(Utc::now());
                info!(alert = %id, rule = %alert.rule_id, "Alert acknowledged");
                Ok(alert.clone())
            }
        }
    }

    /// Resolve an alert by operator action and send one resolution
    /// notification. Resolving a resolved alert returns it unchanged.
    pub async fn resolve_alert(&self, id: &str) -> Result<Alert, AlertError> {
        let (alert, job) = {
            let mut state = self.state.lock();
            let alert = state
                .alerts
                .get_mut(id)
                .ok_or_else(|| AlertError::UnknownAlert(id.to_string()))?;
            if alert.status == AlertStatus::Resolved {
                return Ok(alert.clone());
            }
            alert.resolve(Utc::now());
            let alert = alert.clone();

            let channels = match state.rule_mut(&alert.rule_id) {
                Some(rule_state) => {
                    if rule_state.open_alert.as_deref() == Some(id) {
                        rule_state.open_alert = None;
                    }
                    rule_state.rule.notification_channels.clone()
                }
                None => Vec::new(),
            };
            state.push_resolved(alert.id.clone(), self.max_alert_history);
            self.metrics.active_alerts.set(state.open_alerts() as i64);
            self.metrics
                .alerts_resolved
                .with_label_values(&[alert.rule_id.as_str()])
                .inc();
            info!(alert = %id, rule = %alert.rule_id, "Alert manually resolved");

            let job = Job {
                notification: Notification::resolved(alert.clone()),
                channels,
            };
            (alert, job)
        };
        self.channels.dispatch(&job.notification, &job.channels).await;
        Ok(alert)
    }

    /// Run one evaluation pass over every enabled rule.
    ///
    /// A rule that fails to evaluate is logged and counted; the others are
    /// unaffected.
    pub async fn evaluate_all(&self) -> EvaluationReport {
        let span = spans::evaluation_pass();
        async {
            let _timer = EvaluationTimer::start(&self.metrics);
            let (mut report, jobs) = self.advance();
            report.dispatch_failures = self.dispatch(jobs).await;
            if report.triggered > 0 || report.resolved > 0 || report.errors > 0 {
                info!(
                    evaluated = report.evaluated,
                    triggered = report.triggered,
                    resolved = report.resolved,
                    errors = report.errors,
                    "Evaluation pass complete"
                );
            }
            report
        }
        .instrument(span)
        .await
    }

    /// Phase one: sample and transition under the lock.
    fn advance(&self) -> (EvaluationReport, Vec<Job>) {
        let snapshot = self.registry.snapshot();
        let now = Instant::now();
        let wall = Utc::now();
        let mut report = EvaluationReport::default();
        let mut jobs = Vec::new();

        let mut guard = self.state.lock();
        let State { rules, alerts, .. } = &mut *guard;
        let mut newly_resolved = Vec::new();

        for rule_state in rules.iter_mut().filter(|r| r.rule.enabled) {
            let _entered = spans::rule(&rule_state.rule.id).entered();
            report.evaluated += 1;

            let value = match rule_state.sample(&snapshot, now) {
                Ok(value) => value,
                Err(e) => {
                    warn!(rule = %rule_state.rule.id, error = %e, "Rule evaluation failed");
                    self.metrics
                        .rule_errors
                        .with_label_values(&[rule_state.rule.id.as_str(), e.error_code()])
                        .inc();
                    report.errors += 1;
                    continue;
                }
            };
            let holds = value.is_some_and(|v| rule_state.rule.condition.holds(v));
            let rule = &rule_state.rule;

            match (holds, rule_state.open_alert.clone()) {
                (true, None) => {
                    if !rule_state.cooldown_elapsed(now) {
                        debug!(rule = %rule.id, "Condition holds but rule is cooling down");
                        continue;
                    }
                    let alert = Alert::open(rule, value.unwrap_or_default(), wall);
                    info!(rule = %rule.id, alert = %alert.id, value = alert.value, "Alert triggered");
                    rule_state.open_alert = Some(alert.id.clone());
                    rule_state.last_triggered_at = Some(now);
                    self.count_trigger(rule);
                    jobs.push(Job {
                        notification: Notification::triggered(alert.clone()),
                        channels: rule.notification_channels.clone(),
                    });
                    alerts.insert(alert.id.clone(), alert);
                    report.triggered += 1;
                }
                (true, Some(alert_id)) => {
                    let Some(alert) = alerts.get_mut(&alert_id) else {
                        rule_state.open_alert = None;
                        continue;
                    };
                    alert.observe(rule, value.unwrap_or(alert.value));
                    if alert.status == AlertStatus::Firing && rule_state.cooldown_elapsed(now) {
                        debug!(rule = %rule.id, alert = %alert_id, "Alert still firing, re-notifying");
                        rule_state.last_triggered_at = Some(now);
                        self.count_trigger(rule);
                        jobs.push(Job {
                            notification: Notification::triggered(alert.clone()),
                            channels: rule.notification_channels.clone(),
                        });
                        report.triggered += 1;
                    }
                }
                (false, Some(alert_id)) => {
                    rule_state.open_alert = None;
                    let Some(alert) = alerts.get_mut(&alert_id) else {
                        continue;
                    };
                    if let Some(v) = value {
                        alert.observe(rule, v);
                    }
                    alert.resolve(wall);
                    info!(rule = %rule.id, alert = %alert_id, "Alert resolved");
                    self.metrics
                        .alerts_resolved
                        .with_label_values(&[rule.id.as_str()])
                        .inc();
                    jobs.push(Job {
                        notification: Notification::resolved(alert.clone()),
                        channels: rule.notification_channels.clone(),
                    });
                    newly_resolved.push(alert_id);
                    report.resolved += 1;
                }
                (false, None) => {}
            }
        }

        for id in newly_resolved {
            guard.push_resolved(id, self.max_alert_history);
        }
        self.metrics.active_alerts.set(guard.open_alerts() as i64);
        (report, jobs)
    }

    fn count_trigger(&self, rule: &AlertRule) {
        self.metrics
            .alerts_triggered
            .with_label_values(&[rule.id.as_str(), rule.severity.as_str()])
            .inc();
    }

    /// Phase two: send every job concurrently. Returns the failure count.
    async fn dispatch(&self, jobs: Vec<Job>) -> usize {
        if jobs.is_empty() {
            return 0;
        }
        let reports: Vec<DispatchReport> = join_all(
            jobs.iter()
                .map(|job| self.channels.dispatch(&job.notification, &job.channels)),
        )
        .await;
        reports.iter().map(|r| r.failed.len()).sum()
    }
}

/// Spawn the periodic evaluation loop.
///
/// The first pass runs one `interval` after startup.
pub fn spawn_evaluation_task(evaluator: Arc<AlertEvaluator>, interval: Duration) -> JoinHandle<()> {
    let period = interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(
            interval_secs = period.as_secs(),
            rules = evaluator.status().rules,
            "Alert evaluation started"
        );
        loop {
            ticker.tick().await;
            evaluator.evaluate_all().await;
        }
    })
}
