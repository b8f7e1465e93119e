//! Integration tests for the sentinel API endpoints

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use sentinel::api::{create_router, AppState};
use sentinel_lib::{
    autoheal::{AuditLog, AutoHealExecutor, CommandAdapter},
    health::{components, HealthRegistry},
    incident::{IncidentManager, ManagerConfig},
    ingest::{BufferConfig, IngestionBuffer},
    models::{AnomalyCategory, AnomalyVerdict, Severity},
    observability::{SentinelMetrics, StructuredLogger},
    stability::StabilityEvaluator,
};

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::BUFFER);
    health_registry.register(components::MONITOR);

    let state = Arc::new(AppState {
        buffer: Arc::new(IngestionBuffer::new(BufferConfig::default())),
        manager: Arc::new(IncidentManager::new(ManagerConfig::default())),
        executor: Arc::new(AutoHealExecutor::new(
            Arc::new(CommandAdapter::new()),
            Arc::new(AuditLog::new()),
        )),
        stability: Arc::new(StabilityEvaluator::default()),
        health_registry,
        metrics: SentinelMetrics::new(),
        logger: StructuredLogger::new("test"),
        dry_run: Arc::new(AtomicBool::new(true)),
        window_duration: Duration::from_secs(300),
    });
    let router = create_router(state.clone());

    (router, state)
}

fn verdict() -> AnomalyVerdict {
    AnomalyVerdict {
        detected: true,
        category: AnomalyCategory::ErrorRate,
        severity: Severity::High,
        title: "Elevated error log rate".to_string(),
        description: "errors crossed the threshold".to_string(),
        evidence: vec![],
        confidence: 0.6,
    }
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

async fn send_json(app: Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;
    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::MONITOR, "Loop stalled");

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_reflects_readiness() {
    let (app, state) = setup_test_app().await;

    let (status, _) = get_json(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.health_registry.set_ready(true);
    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("sentinel_"));
}

#[tokio::test]
async fn test_ingest_logs_accepts_valid_batch() {
    let (app, state) = setup_test_app().await;

    let batch = json!([
        {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": "error",
            "service": "api-gateway",
            "message": "upstream: connection refused",
            "attributes": {}
        },
        {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": "info",
            "service": "api-gateway",
            "message": "request served",
            "attributes": {}
        }
    ]);

    let (status, body) = send_json(app, "POST", "/v1/ingest/logs", batch).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["rejected"], 0);
    assert_eq!(state.buffer.stats().log_entries, 2);
}

#[tokio::test]
async fn test_ingest_rejects_malformed_records_with_count() {
    let (app, _state) = setup_test_app().await;

    // Empty service name fails shape validation
    let batch = json!([
        {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": "error",
            "service": "",
            "message": "boom",
            "attributes": {}
        }
    ]);

    let (status, body) = send_json(app, "POST", "/v1/ingest/logs", batch).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["rejected"], 1);
    assert!(body["first_error"].as_str().is_some());
}

#[tokio::test]
async fn test_ingest_metrics_batch() {
    let (app, state) = setup_test_app().await;

    let batch = json!([
        {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "service": "worker",
            "cpu_percent": 42.0,
            "custom": {}
        }
    ]);

    let (status, body) = send_json(app, "POST", "/v1/ingest/metrics", batch).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], 1);
    assert_eq!(state.buffer.stats().metric_entries, 1);
}

#[tokio::test]
async fn test_incident_listing_and_detail() {
    let (app, state) = setup_test_app().await;
    state.manager.ingest_verdict("api-gateway", &verdict());

    let (status, incidents) = get_json(app.clone(), "/v1/incidents").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(incidents.as_array().unwrap().len(), 1);
    let id = incidents[0]["id"].as_str().unwrap().to_string();

    let (status, incident) = get_json(app.clone(), &format!("/v1/incidents/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(incident["service"], "api-gateway");
    assert_eq!(incident["status"], "open");

    // Status filter excludes non-matching incidents
    let (_, filtered) = get_json(app, "/v1/incidents?status=resolved").await;
    assert!(filtered.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_incident_is_404() {
    let (app, _state) = setup_test_app().await;
    let (status, _) = get_json(
        app,
        "/v1/incidents/00000000-0000-0000-0000-000000000000",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_operator_transition_commands() {
    let (app, state) = setup_test_app().await;
    state.manager.ingest_verdict("api-gateway", &verdict());
    let id = state.manager.list(None, 1)[0].id;

    let (status, incident) = send_json(
        app.clone(),
        "POST",
        &format!("/v1/incidents/{}/acknowledge", id),
        json!({ "assignee": "oncall" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(incident["status"], "acknowledged");
    assert_eq!(incident["assignee"], "oncall");

    let (status, incident) = send_json(
        app.clone(),
        "POST",
        &format!("/v1/incidents/{}/resolve", id),
        json!({ "note": "restarted pods" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(incident["status"], "resolved");

    let (status, incident) = send_json(
        app,
        "POST",
        &format!("/v1/incidents/{}/close", id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(incident["status"], "closed");
}

#[tokio::test]
async fn test_invalid_transition_is_409() {
    let (app, state) = setup_test_app().await;
    state.manager.ingest_verdict("api-gateway", &verdict());
    let id = state.manager.list(None, 1)[0].id;

    // Resolving an open incident skips acknowledgement
    let (status, body) = send_json(
        app,
        "POST",
        &format!("/v1/incidents/{}/resolve", id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("transition"));
}

#[tokio::test]
async fn test_dry_run_flag_round_trip() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get_json(app.clone(), "/v1/autoheal/dry-run").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dry_run"], true);

    let (status, body) = send_json(
        app.clone(),
        "PUT",
        "/v1/autoheal/dry-run",
        json!({ "dry_run": false }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dry_run"], false);

    let (_, body) = get_json(app, "/v1/autoheal/dry-run").await;
    assert_eq!(body["dry_run"], false);
}

#[tokio::test]
async fn test_execute_dry_run_records_audit_entry() {
    let (app, state) = setup_test_app().await;

    let (status, record) = send_json(
        app.clone(),
        "POST",
        "/v1/autoheal/execute",
        json!({
            "action": "restart_service",
            "target": "api-gateway",
            "parameters": {}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["dry_run"], true);
    assert_eq!(record["success"], true);
    assert!(record["message"].as_str().unwrap().starts_with("[DRY RUN]"));

    let (_, audit) = get_json(app, "/v1/audit/remediations").await;
    assert_eq!(audit.as_array().unwrap().len(), 1);
    assert_eq!(audit[0]["action"], "restart_service");
    assert_eq!(state.executor.audit().len(), 1);
}

#[tokio::test]
async fn test_execute_unknown_action_is_422() {
    let (app, _state) = setup_test_app().await;

    let (status, _) = send_json(
        app,
        "POST",
        "/v1/autoheal/execute",
        json!({ "action": "reboot_the_moon", "target": "api" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_execute_with_unknown_incident_is_404() {
    let (app, _state) = setup_test_app().await;

    let (status, _) = send_json(
        app,
        "POST",
        "/v1/autoheal/execute",
        json!({
            "action": "flush_cache",
            "target": "cache-1",
            "incident_id": "00000000-0000-0000-0000-000000000000"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_buffer_stats_exposed() {
    let (app, state) = setup_test_app().await;
    let _ = state.buffer.append_log(sentinel_lib::models::LogRecord {
        timestamp: chrono::Utc::now(),
        level: sentinel_lib::models::LogLevel::Info,
        service: "api".to_string(),
        message: "hello".to_string(),
        attributes: Default::default(),
    });

    let (status, stats) = get_json(app, "/v1/buffer/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["log_entries"], 1);
}

#[tokio::test]
async fn test_baseline_lifecycle() {
    let (app, state) = setup_test_app().await;

    let (status, _) = get_json(app.clone(), "/v1/stability/baseline").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // No metric samples yet: setting a baseline is rejected
    let (status, _) = send_json(app.clone(), "PUT", "/v1/stability/baseline", json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    state
        .buffer
        .append_metric(sentinel_lib::models::MetricSample {
            timestamp: chrono::Utc::now(),
            service: "api".to_string(),
            cpu_percent: Some(40.0),
            memory_percent: None,
            error_rate: None,
            latency_ms: None,
            custom: Default::default(),
        })
        .unwrap();

    let (status, baseline) = send_json(app.clone(), "PUT", "/v1/stability/baseline", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(baseline["cpu_percent"], 40.0);

    let (status, _) = get_json(app, "/v1/stability/baseline").await;
    assert_eq!(status, StatusCode::OK);
}
