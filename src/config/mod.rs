//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, LoggingConfig)
//! - [`cache`]: Cache engine configuration (CacheConfig)
//! - [`alerting`]: Alert evaluator, rules and notification channels
//! - [`health`]: Readiness dependency classification
//! - [`validation`]: Startup validation

mod alerting;
mod cache;
mod health;
mod types;
pub mod validation;

pub use alerting::{
    AlertingConfig, ChannelConfig, ChannelSettings, EmailSettings, RuleConfig, SlackSettings,
    SmsSettings, UnknownChannelPolicy, WebhookSettings,
};
pub use cache::CacheConfig;
pub use health::{DependencyConfig, HealthConfig};
pub use types::{Config, ConfigError, LogFormat, LoggingConfig, RegistryConfig, ServerConfig};
pub use validation::{ValidationError, validate};
