//! pulsewatchd - metrics, cache and alerting daemon.
//!
//! Usage: `pulsewatchd [config.toml]`

use pulsewatch::alerting::spawn_evaluation_task;
use pulsewatch::cache::spawn_cleanup_task;
use pulsewatch::config::{self, Config};
use pulsewatch::health::ComponentStatus;
use pulsewatch::{AppState, http, telemetry};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args().nth(1);
    let config = match &config_path {
        Some(path) => Config::load(path)
            .map_err(|e| anyhow::anyhow!("failed to load config {path}: {e}"))?,
        None => Config::default(),
    };

    telemetry::init_tracing(&config.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
    if config_path.is_none() {
        warn!("No config file given, running with defaults");
    }

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    info!(
        server = %config.server.name,
        listen = %config.server.http_listen,
        policy = %config.cache.eviction_policy,
        "Starting pulsewatchd"
    );

    let state = AppState::from_config(&config)?;

    let sweep = spawn_cleanup_task(&state.cache);
    state.health.report("cache", ComponentStatus::Up, "");
    let evaluation = spawn_evaluation_task(
        state.evaluator.clone(),
        config.alerting.evaluation_interval(),
    );
    state.health.report("alerting", ComponentStatus::Up, "");
    info!(
        rules = state.evaluator.status().rules,
        channels = state.evaluator.channels().len(),
        "Background tasks started"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };
    http::run_http_server(config.server.http_listen, state, shutdown).await?;

    evaluation.abort();
    sweep.abort();
    info!("pulsewatchd stopped");
    Ok(())
}
