//! Alert rule evaluation, alert lifecycle and notification dispatch.

pub mod channels;
mod alert;
mod evaluator;
mod rule;

pub use alert::{Alert, AlertAction, AlertStatus, Notification, severity_marker};
pub use channels::{ChannelRegistry, DispatchReport, NotificationChannel};
pub use evaluator::{AlertEvaluator, AlertingStatus, EvaluationReport, spawn_evaluation_task};
pub use rule::{Aggregation, AlertRule, Condition, Operator, Severity, default_rules};
