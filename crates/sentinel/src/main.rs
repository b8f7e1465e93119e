//! Sentinel - incident response daemon
//!
//! Watches ingested logs and metrics for anomalies, manages the incident
//! lifecycle, consults an external root-cause service, and executes
//! (or simulates) remediation actions.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sentinel_lib::{
    autoheal::{AuditLog, AutoHealExecutor, CommandAdapter},
    detector::{AnomalyDetector, DetectorThresholds},
    health::{components, HealthRegistry},
    incident::{IncidentManager, ManagerConfig},
    ingest::{BufferConfig, IngestionBuffer},
    monitor::{Monitor, MonitorConfig},
    observability::{SentinelMetrics, StructuredLogger},
    rootcause::{AgentClientConfig, HttpRootCauseClient},
    stability::{StabilityEvaluator, StabilityThresholds},
};

use sentinel::{api, config};

const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting sentinel");

    let config = config::SentinelConfig::load()?;
    info!(instance = %config.instance_name, "Sentinel configured");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::BUFFER);
    health_registry.register(components::DETECTOR);
    health_registry.register(components::AGENT_CLIENT);
    health_registry.register(components::AUTOHEAL);
    health_registry.register(components::MONITOR);

    let metrics = SentinelMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(SENTINEL_VERSION);

    let buffer = Arc::new(IngestionBuffer::new(BufferConfig {
        max_age: Duration::from_secs(config.buffer_retention_secs),
        max_records: config.buffer_max_records,
    }));

    let detector = AnomalyDetector::new(DetectorThresholds {
        log_error_ratio: config.log_error_ratio,
        metric_error_rate: config.metric_error_rate,
        cpu_percent: config.cpu_percent,
        memory_percent: config.memory_percent,
        latency_ms: config.latency_ms,
        ..DetectorThresholds::default()
    });

    let stability = Arc::new(StabilityEvaluator::new(StabilityThresholds::default()));

    let manager = Arc::new(IncidentManager::new(ManagerConfig {
        max_agent_retries: config.max_agent_retries,
        resolve_stable_cycles: config.resolve_stable_cycles,
    }));

    let agent = Arc::new(HttpRootCauseClient::new(AgentClientConfig {
        endpoint: config.agent_endpoint.clone(),
        request_timeout: Duration::from_secs(config.agent_timeout_secs),
        ..AgentClientConfig::default()
    })?);

    let executor = Arc::new(AutoHealExecutor::new(
        Arc::new(CommandAdapter::new()),
        Arc::new(AuditLog::new()),
    ));

    let monitor = Arc::new(Monitor::new(
        buffer.clone(),
        detector,
        stability.clone(),
        manager.clone(),
        agent,
        MonitorConfig {
            cycle_interval: Duration::from_secs(config.cycle_interval_secs),
            window_duration: Duration::from_secs(config.window_secs),
            rerun_degrading_cycles: config.rerun_degrading_cycles,
        },
        health_registry.clone(),
        logger.clone(),
    ));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let monitor_handle = tokio::spawn(monitor.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState {
        buffer,
        manager,
        executor,
        stability,
        health_registry: health_registry.clone(),
        metrics,
        logger: logger.clone(),
        dry_run: Arc::new(AtomicBool::new(config.dry_run)),
        window_duration: Duration::from_secs(config.window_secs),
    });

    // Mark ready once every component is wired
    health_registry.set_ready(true);

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    let _ = shutdown_tx.send(());
    monitor_handle.abort();
    api_handle.abort();

    Ok(())
}
