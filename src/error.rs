//! Unified error handling for pulsewatch.
//!
//! This module provides the error hierarchy shared by the registry, cache and
//! alerting subsystems. Every error exposes a static `error_code` used for
//! internal metric labeling.

use thiserror::Error;

use crate::registry::MetricKind;

// ============================================================================
// Metric Registry Errors
// ============================================================================

/// Errors raised synchronously by the metric registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    #[error("metric {name} is registered as {registered}, not {requested}")]
    TypeKindMismatch {
        name: String,
        registered: MetricKind,
        requested: MetricKind,
    },

    #[error("invalid counter increment for {name}: {amount}")]
    InvalidAmount { name: String, amount: f64 },

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: f64 },

    #[error("invalid metric name: {0:?}")]
    InvalidName(String),

    #[error("invalid label name: {0:?}")]
    InvalidLabel(String),

    #[error("histogram buckets for {0} must be finite and strictly increasing")]
    InvalidBuckets(String),
}

impl MetricError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TypeKindMismatch { .. } => "type_kind_mismatch",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::InvalidValue { .. } => "invalid_value",
            Self::InvalidName(_) => "invalid_name",
            Self::InvalidLabel(_) => "invalid_label",
            Self::InvalidBuckets(_) => "invalid_buckets",
        }
    }
}

// ============================================================================
// Cache Errors
// ============================================================================

/// Cache errors.
///
/// Serialization failures never escape `get`/`set`; they are only returned by
/// helpers that explicitly ask for them.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache serialization failed for {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid invalidation pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl CacheError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Serialization { .. } => "serialization",
            Self::InvalidPattern(_) => "invalid_pattern",
        }
    }
}

// ============================================================================
// Alert Rule Errors
// ============================================================================

/// Rule administration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("rule {0}: cooldown must not be negative")]
    InvalidCooldown(String),

    #[error("rule {0}: threshold must be a finite number")]
    NonFiniteThreshold(String),

    #[error("rule {rule}: unknown notification channel {channel}")]
    UnknownChannel { rule: String, channel: String },

    #[error("rule {0} already exists")]
    DuplicateRule(String),

    #[error("no such rule: {0}")]
    UnknownRule(String),
}

impl RuleError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCooldown(_) => "invalid_cooldown",
            Self::NonFiniteThreshold(_) => "non_finite_threshold",
            Self::UnknownChannel { .. } => "unknown_channel",
            Self::DuplicateRule(_) => "duplicate_rule",
            Self::UnknownRule(_) => "unknown_rule",
        }
    }
}

/// Operator actions on alert instances.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertError {
    #[error("no such alert: {0}")]
    UnknownAlert(String),

    #[error("alert {0} is already resolved")]
    AlreadyResolved(String),
}

impl AlertError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownAlert(_) => "unknown_alert",
            Self::AlreadyResolved(_) => "already_resolved",
        }
    }
}

/// Errors produced while evaluating a single rule.
///
/// Caught per rule by the evaluator; never aborts an evaluation pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("metric {metric} produced a non-finite value {value}")]
    NonFiniteValue { metric: String, value: f64 },
}

impl EvaluationError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NonFiniteValue { .. } => "non_finite_value",
        }
    }
}

// ============================================================================
// Notification Channel Errors
// ============================================================================

/// Notification delivery errors.
///
/// These are transient from the evaluator's point of view: logged, counted
/// and swallowed.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned status {0}")]
    Status(u16),

    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("delivery timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("channel {0} is disabled")]
    Disabled(String),

    #[error("channel {0} is rate limited")]
    RateLimited(String),

    #[error("channel misconfigured: {0}")]
    Misconfigured(String),
}

impl ChannelError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Status(_) => "status",
            Self::Smtp(_) => "smtp",
            Self::Address(_) => "address",
            Self::Message(_) => "message",
            Self::Timeout(_) => "timeout",
            Self::Disabled(_) => "disabled",
            Self::RateLimited(_) => "rate_limited",
            Self::Misconfigured(_) => "misconfigured",
        }
    }
}

// ============================================================================
// Startup Errors
// ============================================================================

/// Failures while assembling the shared application state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("internal metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("metric registry: {0}")]
    Registry(#[from] MetricError),

    #[error("notification channel: {0}")]
    Channel(#[from] ChannelError),

    #[error("alert rule: {0}")]
    Rule(#[from] RuleError),
}
