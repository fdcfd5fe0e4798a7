//! Admin and export HTTP surface.
//!
//! Serves the Prometheus scrape endpoint, health probes, and the cache and
//! alert administration routes over one axum `Router`.

use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Instrument, debug, info};

use crate::alerting::{AlertEvaluator, ChannelRegistry};
use crate::cache::{CacheEngine, KeyPattern};
use crate::config::Config;
use crate::error::{AlertError, CacheError, StartupError};
use crate::health::{ComponentStatus, HealthRegistry};
use crate::metrics::InternalMetrics;
use crate::registry::MetricRegistry;
use crate::telemetry::spans;

/// Shared handles to every subsystem, built once at startup.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<MetricRegistry>,
    pub cache: Arc<CacheEngine>,
    pub evaluator: Arc<AlertEvaluator>,
    pub health: Arc<HealthRegistry>,
    pub metrics: Arc<InternalMetrics>,
}

impl AppState {
    /// Construct all subsystems from configuration and install the
    /// configured alert rules.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let metrics = Arc::new(InternalMetrics::new()?);
        let registry = Arc::new(MetricRegistry::with_default_buckets(
            config.registry.default_buckets.clone(),
        )?);
        let cache = Arc::new(CacheEngine::new(config.cache.clone(), Arc::clone(&metrics)));
        let channels = Arc::new(ChannelRegistry::from_config(
            &config.alerting,
            Arc::clone(&metrics),
        )?);
        let evaluator = Arc::new(AlertEvaluator::new(
            Arc::clone(&registry),
            channels,
            Arc::clone(&metrics),
            &config.alerting,
        ));
        let installed = evaluator.install_rules(&config.alerting)?;
        info!(rules = installed, "Alert rules installed");

        Ok(Self {
            registry,
            cache,
            evaluator,
            health: Arc::new(HealthRegistry::from_config(&config.health)),
            metrics,
        })
    }
}

/// JSON error body with a stable code.
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.message, "code": self.code });
        (self.status, Json(body)).into_response()
    }
}

impl From<AlertError> for ApiError {
    fn from(e: AlertError) -> Self {
        let status = match e {
            AlertError::UnknownAlert(_) => StatusCode::NOT_FOUND,
            AlertError::AlreadyResolved(_) => StatusCode::CONFLICT,
        };
        Self {
            status,
            code: e.error_code(),
            message: e.to_string(),
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(e: CacheError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: e.error_code(),
            message: e.to_string(),
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_text))
        .route("/metrics/json", get(metrics_json))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/health/report", post(health_report))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/invalidate", post(cache_invalidate))
        .route("/cache/clear", post(cache_clear))
        .route("/alerts", get(list_alerts))
        .route("/alerts/status", get(alerts_status))
        .route("/alerts/rules", get(list_rules))
        .route("/alerts/:id/ack", post(acknowledge_alert))
        .route("/alerts/:id/resolve", post(resolve_alert))
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

async fn trace_request(req: Request, next: Next) -> Response {
    let span = spans::http_request(req.method().as_str(), req.uri().path());
    async move {
        let response = next.run(req).await;
        debug!(status = response.status().as_u16(), "Request handled");
        response
    }
    .instrument(span)
    .await
}

/// GET /metrics - registry families followed by internal metrics.
async fn metrics_text(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = state.registry.snapshot().to_prometheus_text();
    body.push_str(&state.metrics.gather());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

async fn metrics_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.snapshot())
}

async fn health_live(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.liveness())
}

/// GET /health/ready - 503 while a critical component is down.
async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let readiness = state.health.readiness();
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}

#[derive(Debug, Deserialize)]
struct HealthReport {
    component: String,
    status: ComponentStatus,
    #[serde(default)]
    message: String,
}

/// POST /health/report - a dependency pushes its current status.
async fn health_report(
    State(state): State<AppState>,
    Json(report): Json<HealthReport>,
) -> impl IntoResponse {
    state
        .health
        .report(&report.component, report.status, report.message);
    StatusCode::NO_CONTENT
}

async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.cache.stats())
}

#[derive(Debug, Deserialize)]
struct InvalidateRequest {
    pattern: String,
    #[serde(default)]
    regex: bool,
}

async fn cache_invalidate(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pattern = if req.regex {
        KeyPattern::regex(&req.pattern)?
    } else {
        KeyPattern::substring(req.pattern)
    };
    let removed = state.cache.invalidate_by_pattern(&pattern);
    Ok(Json(json!({ "removed": removed })))
}

async fn cache_clear(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "removed": state.cache.clear() }))
}

#[derive(Debug, Default, Deserialize)]
struct AlertQuery {
    /// Only firing and acknowledged alerts.
    #[serde(default)]
    active: bool,
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> impl IntoResponse {
    let alerts = if query.active {
        state.evaluator.active_alerts()
    } else {
        state.evaluator.all_alerts()
    };
    Json(alerts)
}

async fn alerts_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.evaluator.status())
}

async fn list_rules(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.evaluator.rules())
}

async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.evaluator.acknowledge_alert(&id)?))
}

async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.evaluator.resolve_alert(&id).await?))
}

/// Serve the router on `listener` until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Bind `addr` and serve until `shutdown` completes.
pub async fn run_http_server<F>(addr: SocketAddr, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    serve(listener, state, shutdown).await
}
