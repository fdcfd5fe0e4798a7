//! End-to-end tests of the admin HTTP surface.

mod common;

use common::TestServer;
use pulsewatch::config::Config;
use pulsewatch::Labels;
use reqwest::StatusCode;
use serde_json::{Value, json};

const CONFIG: &str = r#"
[[health.dependencies]]
name = "database"

[[health.dependencies]]
name = "smtp"
critical = false

[[alerting.channels]]
id = "ops-log"
kind = "log"

[[alerting.rules]]
id = "queue_backlog"
name = "Queue Backlog"
metric = "queue_depth"
operator = "gte"
threshold = 100.0
severity = "warning"
channels = ["ops-log"]
"#;

async fn spawn() -> TestServer {
    let config: Config = toml::from_str(CONFIG).unwrap();
    TestServer::spawn(config).await.unwrap()
}

#[tokio::test]
async fn test_metrics_endpoint_serves_prometheus_text() {
    let server = spawn().await;
    server
        .state
        .registry
        .increment_counter("jobs_total", &Labels::from([("queue", "mail")]), 2.0)
        .unwrap();

    let response = reqwest::get(server.url("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    let body = response.text().await.unwrap();
    assert!(body.contains("# TYPE jobs_total counter"));
    assert!(body.contains("jobs_total{queue=\"mail\"} 2"));
    assert!(body.contains("pulsewatch_cache_entries"));

    let json: Value = reqwest::get(server.url("/metrics/json"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["families"][0]["name"], "jobs_total");
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_readiness_tracks_critical_dependencies() {
    let server = spawn().await;
    let client = reqwest::Client::new();

    let live = client.get(server.url("/health/live")).send().await.unwrap();
    assert_eq!(live.status(), StatusCode::OK);

    let ready = client.get(server.url("/health/ready")).send().await.unwrap();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = ready.json().await.unwrap();
    assert_eq!(body["failing"], json!(["database"]));

    let report = client
        .post(server.url("/health/report"))
        .json(&json!({"component": "database", "status": "up"}))
        .send()
        .await
        .unwrap();
    assert_eq!(report.status(), StatusCode::NO_CONTENT);
    client
        .post(server.url("/health/report"))
        .json(&json!({"component": "smtp", "status": "down", "message": "refused"}))
        .send()
        .await
        .unwrap();

    let ready = client.get(server.url("/health/ready")).send().await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_cache_administration() {
    let server = spawn().await;
    let client = reqwest::Client::new();
    for key in ["user:1", "user:2", "session:9"] {
        server.state.cache.set(key, "v", None);
    }

    let removed: Value = client
        .post(server.url("/cache/invalidate"))
        .json(&json!({"pattern": "^user:"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // Substring match: the literal "^user:" matches nothing.
    assert_eq!(removed["removed"], 0);

    let removed: Value = client
        .post(server.url("/cache/invalidate"))
        .json(&json!({"pattern": "^user:", "regex": true}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(removed["removed"], 2);

    let bad = client
        .post(server.url("/cache/invalidate"))
        .json(&json!({"pattern": "(", "regex": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    let body: Value = bad.json().await.unwrap();
    assert_eq!(body["code"], "invalid_pattern");

    let stats: Value = client
        .get(server.url("/cache/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["entries"], 1);
    assert_eq!(stats["policy"], "lru");

    let cleared: Value = client
        .post(server.url("/cache/clear"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["removed"], 1);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_alert_administration() {
    let server = spawn().await;
    let client = reqwest::Client::new();

    let rules: Value = client
        .get(server.url("/alerts/rules"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rules[0]["id"], "queue_backlog");

    server
        .state
        .registry
        .set_gauge("queue_depth", &Labels::new(), 150.0)
        .unwrap();
    server.state.evaluator.evaluate_all().await;

    let active: Value = client
        .get(server.url("/alerts?active=true"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = active[0]["id"].as_str().unwrap().to_string();

    let acked = client
        .post(server.url(&format!("/alerts/{id}/ack")))
        .send()
        .await
        .unwrap();
    assert_eq!(acked.status(), StatusCode::OK);
    let acked: Value = acked.json().await.unwrap();
    assert_eq!(acked["status"], "acknowledged");

    let resolved: Value = client
        .post(server.url(&format!("/alerts/{id}/resolve")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resolved["status"], "resolved");

    let conflict = client
        .post(server.url(&format!("/alerts/{id}/ack")))
        .send()
        .await
        .unwrap();
    assert_eq!(conflict.status(), StatusCode::CONFLICT);

    let missing = client
        .post(server.url("/alerts/nope/ack"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["code"], "unknown_alert");

    let status: Value = client
        .get(server.url("/alerts/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["rules"], 1);
    assert_eq!(status["active_alerts"], 0);
    assert_eq!(status["channels"], 1);
    server.stop().await.unwrap();
}
