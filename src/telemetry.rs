//! Tracing setup, span constructors and timing guards.

use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::metrics::InternalMetrics;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `logging.level`. Returns an error if a
/// global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

/// Guard for timing an evaluation pass.
///
/// Records the pass duration and count when dropped.
pub struct EvaluationTimer<'a> {
    metrics: &'a InternalMetrics,
    start: Instant,
}

impl<'a> EvaluationTimer<'a> {
    pub fn start(metrics: &'a InternalMetrics) -> Self {
        Self {
            metrics,
            start: Instant::now(),
        }
    }
}

impl Drop for EvaluationTimer<'_> {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.metrics.alert_evaluation_duration.observe(duration);
        self.metrics.alert_evaluations.inc();
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// One `evaluate_all` pass.
    pub fn evaluation_pass() -> Span {
        info_span!("evaluation_pass")
    }

    /// A single rule inside a pass.
    pub fn rule(id: &str) -> Span {
        info_span!("rule", rule = %id)
    }

    /// Delivery of one notification to one channel.
    pub fn dispatch(channel: &str, kind: &str, action: &str) -> Span {
        info_span!("dispatch", channel = %channel, kind = %kind, action = %action)
    }

    /// An admin/export HTTP request.
    pub fn http_request(method: &str, path: &str) -> Span {
        info_span!("http_request", method = %method, path = %path)
    }
}
