//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use super::alerting::AlertingConfig;
use super::cache::CacheConfig;
use super::health::HealthConfig;
use crate::registry::DEFAULT_BUCKETS;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server identity and HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Metric registry defaults.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Cache engine.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Alert evaluator, rules and channels.
    #[serde(default)]
    pub alerting: AlertingConfig,
    /// Readiness dependencies.
    #[serde(default)]
    pub health: HealthConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name, attached to log output and notifications.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Address of the admin/export HTTP listener (default: 127.0.0.1:9464).
    #[serde(default = "default_http_listen")]
    pub http_listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            http_listen: default_http_listen(),
        }
    }
}

fn default_server_name() -> String {
    "pulsewatch".to_string()
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9464))
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
///
/// `RUST_LOG` takes precedence over `level` when set.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (default: "info").
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (default: text).
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metric registry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Buckets used for histograms created on first observation.
    #[serde(default = "default_buckets")]
    pub default_buckets: Vec<f64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_buckets: default_buckets(),
        }
    }
}

fn default_buckets() -> Vec<f64> {
    DEFAULT_BUCKETS.to_vec()
}

pub(super) fn default_true() -> bool {
    true
}
