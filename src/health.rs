//! Liveness and readiness.
//!
//! Components report their own status; readiness is derived from the
//! `[health]` classification of which components are critical.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::HealthConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Degraded,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub critical: bool,
    /// `None` until the component first reports.
    pub status: Option<ComponentStatus>,
    pub message: String,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Liveness {
    pub alive: bool,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Readiness {
    pub ready: bool,
    /// Critical components that are down or never reported.
    pub failing: Vec<String>,
    pub components: Vec<ComponentHealth>,
}

#[derive(Debug)]
pub struct HealthRegistry {
    started_at: DateTime<Utc>,
    components: DashMap<String, ComponentHealth>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            components: DashMap::new(),
        }
    }
}

impl HealthRegistry {
    /// Pre-declare the configured dependencies. Critical ones keep readiness
    /// failing until they report.
    pub fn from_config(config: &HealthConfig) -> Self {
        let registry = Self::default();
        for dep in &config.dependencies {
            registry.declare(&dep.name, dep.critical);
        }
        registry
    }

    pub fn declare(&self, name: &str, critical: bool) {
        self.components
            .entry(name.to_string())
            .and_modify(|c| c.critical = critical)
            .or_insert_with(|| ComponentHealth {
                name: name.to_string(),
                critical,
                status: None,
                message: String::new(),
                updated_at: None,
            });
    }

    /// Record a component's status. Undeclared components are non-critical.
    pub fn report(&self, name: &str, status: ComponentStatus, message: impl Into<String>) {
        let message = message.into();
        let mut entry = self
            .components
            .entry(name.to_string())
            .or_insert_with(|| ComponentHealth {
                name: name.to_string(),
                critical: false,
                status: None,
                message: String::new(),
                updated_at: None,
            });
        let previous = entry.status.replace(status);
        if previous != Some(status) {
            match status {
                ComponentStatus::Up => info!(component = %name, "Component up"),
                ComponentStatus::Degraded | ComponentStatus::Down => {
                    warn!(component = %name, status = ?status, message = %message, "Component health changed")
                }
            }
        }
        entry.message = message;
        entry.updated_at = Some(Utc::now());
    }

    /// Always alive once the process is running.
    pub fn liveness(&self) -> Liveness {
        Liveness {
            alive: true,
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
        }
    }

    pub fn readiness(&self) -> Readiness {
        let mut components: Vec<ComponentHealth> =
            self.components.iter().map(|c| c.value().clone()).collect();
        components.sort_by(|a, b| a.name.cmp(&b.name));
        let failing: Vec<String> = components
            .iter()
            .filter(|c| c.critical && matches!(c.status, None | Some(ComponentStatus::Down)))
            .map(|c| c.name.clone())
            .collect();
        Readiness {
            ready: failing.is_empty(),
            failing,
            components,
        }
    }
}
