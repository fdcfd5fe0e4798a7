//! Readiness dependency configuration.

use serde::Deserialize;

use super::types::default_true;

/// Health configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthConfig {
    /// Dependencies tracked by the readiness probe.
    #[serde(default)]
    pub dependencies: Vec<DependencyConfig>,
}

/// A dependency reported into the health registry.
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyConfig {
    pub name: String,
    /// Critical dependencies fail readiness when down (default: true).
    #[serde(default = "default_true")]
    pub critical: bool,
}
