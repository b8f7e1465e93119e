//! HTTP API for ingestion, incident commands, remediation, and probes

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use sentinel_lib::{
    autoheal::AutoHealExecutor,
    health::{components, ComponentStatus, HealthRegistry},
    incident::IncidentManager,
    ingest::IngestionBuffer,
    models::{Baseline, HealAction, IncidentStatus, LogRecord, MetricSample},
    observability::{SentinelMetrics, StructuredLogger},
    stability::StabilityEvaluator,
    SentinelError,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub buffer: Arc<IngestionBuffer>,
    pub manager: Arc<IncidentManager>,
    pub executor: Arc<AutoHealExecutor>,
    pub stability: Arc<StabilityEvaluator>,
    pub health_registry: HealthRegistry,
    pub metrics: SentinelMetrics,
    pub logger: StructuredLogger,
    /// Global dry-run flag; remediation defaults to simulation-only
    pub dry_run: Arc<AtomicBool>,
    /// Window used when setting a baseline from current data
    pub window_duration: Duration,
}

fn error_response(err: &SentinelError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err {
        SentinelError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SentinelError::IncidentNotFound(_) => StatusCode::NOT_FOUND,
        SentinelError::InvalidTransition { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    accepted: usize,
    rejected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_error: Option<String>,
}

/// Batch log ingestion; shape validation only, auth assumed upstream
async fn ingest_logs(
    State(state): State<Arc<AppState>>,
    Json(records): Json<Vec<LogRecord>>,
) -> impl IntoResponse {
    let mut accepted = 0;
    let mut rejected = 0;
    let mut first_error = None;

    for record in records {
        match state.buffer.append_log(record) {
            Ok(()) => {
                accepted += 1;
                state.metrics.inc_ingested("log");
            }
            Err(err) => {
                rejected += 1;
                state.metrics.inc_rejected();
                first_error.get_or_insert_with(|| err.to_string());
            }
        }
    }

    let status = if rejected > 0 {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::ACCEPTED
    };
    (status, Json(IngestResponse { accepted, rejected, first_error }))
}

/// Batch metric ingestion
async fn ingest_metrics(
    State(state): State<Arc<AppState>>,
    Json(samples): Json<Vec<MetricSample>>,
) -> impl IntoResponse {
    let mut accepted = 0;
    let mut rejected = 0;
    let mut first_error = None;

    for sample in samples {
        match state.buffer.append_metric(sample) {
            Ok(()) => {
                accepted += 1;
                state.metrics.inc_ingested("metric");
            }
            Err(err) => {
                rejected += 1;
                state.metrics.inc_rejected();
                first_error.get_or_insert_with(|| err.to_string());
            }
        }
    }

    let status = if rejected > 0 {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::ACCEPTED
    };
    (status, Json(IngestResponse { accepted, rejected, first_error }))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<IncidentStatus>,
    limit: Option<usize>,
}

async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let incidents = state.manager.list(query.status, query.limit.unwrap_or(100));
    Json(incidents)
}

async fn get_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.manager.get(id) {
        Ok(incident) => (StatusCode::OK, Json(json!(incident))),
        Err(err) => error_response(&err),
    }
}

async fn get_incident_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.manager.summary(id) {
        Ok(summary) => (StatusCode::OK, Json(json!(summary))),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Default, Deserialize)]
struct AcknowledgeRequest {
    assignee: Option<String>,
}

async fn acknowledge_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<AcknowledgeRequest>>,
) -> impl IntoResponse {
    let assignee = body.and_then(|Json(b)| b.assignee);
    match state.manager.acknowledge(id, assignee) {
        Ok(incident) => {
            state.logger.log_incident(
                &incident.id.to_string(),
                &incident.service,
                &incident.status.to_string(),
                &incident.severity.to_string(),
                incident.detection_count,
            );
            (StatusCode::OK, Json(json!(incident)))
        }
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Default, Deserialize)]
struct NoteRequest {
    note: Option<String>,
}

async fn resolve_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<NoteRequest>>,
) -> impl IntoResponse {
    let note = body.and_then(|Json(b)| b.note);
    match state.manager.resolve(id, note) {
        Ok(incident) => (StatusCode::OK, Json(json!(incident))),
        Err(err) => error_response(&err),
    }
}

async fn close_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<NoteRequest>>,
) -> impl IntoResponse {
    let note = body.and_then(|Json(b)| b.note);
    match state.manager.close(id, note) {
        Ok(incident) => (StatusCode::OK, Json(json!(incident))),
        Err(err) => error_response(&err),
    }
}

async fn get_dry_run(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "dry_run": state.dry_run.load(Ordering::SeqCst) }))
}

#[derive(Debug, Deserialize)]
struct DryRunRequest {
    dry_run: bool,
}

async fn set_dry_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DryRunRequest>,
) -> impl IntoResponse {
    state.dry_run.store(body.dry_run, Ordering::SeqCst);
    info!(dry_run = body.dry_run, "Dry-run flag updated");
    Json(json!({ "dry_run": body.dry_run }))
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    action: String,
    target: String,
    #[serde(default)]
    parameters: HashMap<String, String>,
    incident_id: Option<Uuid>,
    /// Overrides the global flag for this call only
    dry_run: Option<bool>,
}

/// Operator-initiated remediation
async fn execute_heal(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExecuteRequest>,
) -> impl IntoResponse {
    let action: HealAction = match body.action.parse() {
        Ok(action) => action,
        Err(err) => return error_response(&SentinelError::Validation(err)),
    };

    // A record must reference a real incident or carry none at all
    if let Some(id) = body.incident_id {
        if let Err(err) = state.manager.get(id) {
            return error_response(&err);
        }
    }

    let dry_run = body.dry_run.unwrap_or_else(|| state.dry_run.load(Ordering::SeqCst));
    let record = state
        .executor
        .execute(action, &body.target, body.parameters, dry_run, body.incident_id)
        .await;

    state.metrics.inc_remediation(&record.action.to_string(), record.dry_run);
    state.logger.log_remediation(
        &record.action.to_string(),
        &record.target,
        record.dry_run,
        record.success,
        &record.message,
    );
    if record.success {
        state.health_registry.set_healthy(components::AUTOHEAL);
    } else {
        state
            .health_registry
            .set_degraded(components::AUTOHEAL, record.message.clone());
    }

    (StatusCode::OK, Json(json!(record)))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    limit: Option<usize>,
}

async fn list_remediations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> impl IntoResponse {
    Json(state.executor.audit().entries(query.limit.unwrap_or(100)))
}

async fn buffer_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.buffer.stats())
}

async fn get_baseline(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.stability.baseline() {
        Some(baseline) => (StatusCode::OK, Json(json!(baseline))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no baseline set" })),
        ),
    }
}

/// Replace the baseline with current window averages; explicit operator action
async fn set_baseline(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let window = state.buffer.snapshot(state.window_duration);
    if window.metrics.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "no metric samples in window" })),
        );
    }
    let baseline: Baseline = state.stability.set_baseline(&window);
    (StatusCode::OK, Json(json!(baseline)))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health();

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness();

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, [("content-type", "text/plain")], Vec::new());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ingest/logs", post(ingest_logs))
        .route("/v1/ingest/metrics", post(ingest_metrics))
        .route("/v1/incidents", get(list_incidents))
        .route("/v1/incidents/:id", get(get_incident))
        .route("/v1/incidents/:id/summary", get(get_incident_summary))
        .route("/v1/incidents/:id/acknowledge", post(acknowledge_incident))
        .route("/v1/incidents/:id/resolve", post(resolve_incident))
        .route("/v1/incidents/:id/close", post(close_incident))
        .route("/v1/autoheal/dry-run", get(get_dry_run).put(set_dry_run))
        .route("/v1/autoheal/execute", post(execute_heal))
        .route("/v1/audit/remediations", get(list_remediations))
        .route("/v1/buffer/stats", get(buffer_stats))
        .route("/v1/stability/baseline", get(get_baseline).put(set_baseline))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
