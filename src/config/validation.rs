//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use thiserror::Error;

use crate::registry::is_valid_metric_name;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("cache.max_entries must be at least 1")]
    ZeroCacheCapacity,
    #[error("cache.cleanup_interval_secs must be at least 1")]
    ZeroCleanupInterval,
    #[error("alerting.evaluation_interval_secs must be at least 1")]
    ZeroEvaluationInterval,
    #[error("alerting.dispatch_timeout_secs must be at least 1")]
    ZeroDispatchTimeout,
    #[error("registry.default_buckets must be finite and strictly increasing")]
    InvalidBuckets,
    #[error("duplicate channel id: {0}")]
    DuplicateChannel(String),
    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),
    #[error("rule {rule}: invalid metric name {metric:?}")]
    InvalidRuleMetric { rule: String, metric: String },
    #[error("rule {0}: threshold must be a finite number")]
    NonFiniteThreshold(String),
    #[error("rule {0}: cooldown_secs must not be negative")]
    NegativeCooldown(String),
}

/// Validate a configuration, returning all errors found.
///
/// Channel references in rules are checked later, when rules are registered
/// with the evaluator (see `alerting.unknown_channel`).
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.cache.max_entries == 0 {
        errors.push(ValidationError::ZeroCacheCapacity);
    }
    if config.cache.cleanup_interval_secs == 0 {
        errors.push(ValidationError::ZeroCleanupInterval);
    }
    if config.alerting.evaluation_interval_secs == 0 {
        errors.push(ValidationError::ZeroEvaluationInterval);
    }
    if config.alerting.dispatch_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDispatchTimeout);
    }

    let buckets = &config.registry.default_buckets;
    if !(buckets.iter().all(|b| b.is_finite()) && buckets.windows(2).all(|w| w[0] < w[1])) {
        errors.push(ValidationError::InvalidBuckets);
    }

    let mut channel_ids = HashSet::new();
    for channel in &config.alerting.channels {
        if !channel_ids.insert(channel.id.as_str()) {
            errors.push(ValidationError::DuplicateChannel(channel.id.clone()));
        }
    }

    let mut rule_ids = HashSet::new();
    for rule in &config.alerting.rules {
        if !rule_ids.insert(rule.id.as_str()) {
            errors.push(ValidationError::DuplicateRule(rule.id.clone()));
        }
        if !is_valid_metric_name(&rule.metric) {
            errors.push(ValidationError::InvalidRuleMetric {
                rule: rule.id.clone(),
                metric: rule.metric.clone(),
            });
        }
        if !rule.threshold.is_finite() {
            errors.push(ValidationError::NonFiniteThreshold(rule.id.clone()));
        }
        if rule.cooldown_secs < 0 {
            errors.push(ValidationError::NegativeCooldown(rule.id.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
