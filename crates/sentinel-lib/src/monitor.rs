//! Timer-driven evaluation loop
//!
//! Each cycle takes one buffer snapshot, then evaluates every service seen
//! in it as an independent scope: detect, fold into the incident store,
//! check stability, and (conditionally) call the root-cause service. A
//! failure in one scope never aborts the others, and a service whose
//! previous evaluation is still in flight is skipped rather than run
//! concurrently.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinSet;
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, warn};

use crate::detector::AnomalyDetector;
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::incident::{IncidentManager, IngestOutcome};
use crate::ingest::IngestionBuffer;
use crate::models::{RootCauseRequest, RootCauseState};
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::rootcause::RootCauseClient;
use crate::stability::{StabilityEvaluator, StabilityTracker};

/// Configuration for the evaluation loop
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Cycle interval (default: 5 minutes)
    pub cycle_interval: Duration,
    /// Window duration handed to the detector each cycle
    pub window_duration: Duration,
    /// Consecutive degrading cycles before a root-cause re-run
    pub rerun_degrading_cycles: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(300),
            window_duration: Duration::from_secs(300),
            rerun_degrading_cycles: 2,
        }
    }
}

/// The timer-driven consumer tying buffer, detector, manager, stability,
/// and the reasoning service together
pub struct Monitor {
    buffer: Arc<IngestionBuffer>,
    detector: AnomalyDetector,
    stability: Arc<StabilityEvaluator>,
    manager: Arc<IncidentManager>,
    agent: Arc<dyn RootCauseClient>,
    config: MonitorConfig,
    /// Services with an evaluation currently running
    in_flight: Arc<DashMap<String, ()>>,
    trackers: Arc<DashMap<String, StabilityTracker>>,
    metrics: SentinelMetrics,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl Monitor {
    pub fn new(
        buffer: Arc<IngestionBuffer>,
        detector: AnomalyDetector,
        stability: Arc<StabilityEvaluator>,
        manager: Arc<IncidentManager>,
        agent: Arc<dyn RootCauseClient>,
        config: MonitorConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            buffer,
            detector,
            stability,
            manager,
            agent,
            config,
            in_flight: Arc::new(DashMap::new()),
            trackers: Arc::new(DashMap::new()),
            metrics: SentinelMetrics::new(),
            health,
            logger,
        }
    }

    /// Run the loop until a shutdown signal arrives
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.cycle_interval.as_secs(),
            "Starting evaluation loop"
        );

        let mut ticker = interval(self.config.cycle_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let monitor = self.clone();
                    // The cycle runs detached so a slow scope never delays
                    // the ticker; the in-flight set keeps overlapping cycles
                    // off the same service.
                    tokio::spawn(async move {
                        monitor.run_cycle().await;
                    });
                }
                _ = shutdown.recv() => {
                    info!("Shutting down evaluation loop");
                    break;
                }
            }
        }
    }

    /// Evaluate one cycle across all services seen in the window
    pub async fn run_cycle(self: &Arc<Self>) {
        let start = Instant::now();
        let window = self.buffer.snapshot(self.config.window_duration);
        let stats = self.buffer.stats();
        self.metrics
            .set_buffer_occupancy(stats.log_entries as i64, stats.metric_entries as i64);
        if stats.log_entries >= stats.capacity || stats.metric_entries >= stats.capacity {
            self.health.set_degraded(
                components::BUFFER,
                "retention ceiling reached, evicting oldest records",
            );
        } else {
            self.health.set_healthy(components::BUFFER);
        }

        if window.is_empty() {
            debug!("Window empty, nothing to evaluate");
            return;
        }

        let mut scopes = JoinSet::new();
        for service in window.services() {
            if self.in_flight.insert(service.clone(), ()).is_some() {
                warn!(service = %service, "Previous evaluation still running, skipping");
                self.metrics.inc_scope_skipped_busy();
                continue;
            }

            let monitor = self.clone();
            let scoped = window.scoped_to(&service);
            scopes.spawn(async move {
                if let Err(err) = monitor.evaluate_scope(&service, scoped).await {
                    error!(service = %service, error = %err, "Scope evaluation failed");
                    monitor.metrics.inc_scope_error();
                    monitor
                        .health
                        .set_degraded(components::DETECTOR, err.to_string());
                }
                monitor.in_flight.remove(&service);
            });
        }

        while scopes.join_next().await.is_some() {}

        self.metrics
            .set_incidents_active(self.manager.active_count() as i64);
        self.metrics
            .observe_cycle_latency(start.elapsed().as_secs_f64());
        self.health.set_healthy(components::MONITOR);
    }

    async fn evaluate_scope(&self, service: &str, window: crate::ingest::Window) -> Result<()> {
        let verdict = self.detector.evaluate(&window)?;

        let outcome = if verdict.detected {
            self.metrics.inc_detection(&verdict.category.to_string());
            self.logger.log_detection(
                service,
                &verdict.category.to_string(),
                &verdict.severity.to_string(),
                verdict.confidence,
                &verdict.title,
            );
            self.manager.ingest_verdict(service, &verdict)
        } else {
            IngestOutcome::Ignored
        };

        // Stability feeds both auto-resolution and the re-run decision
        let mut rerun_wanted = false;
        {
            let mut tracker = self
                .trackers
                .entry(service.to_string())
                .or_insert_with(|| StabilityTracker::new(self.config.rerun_degrading_cycles));
            if let Some(report) = self.stability.evaluate(&window, tracker.previous()) {
                self.metrics
                    .set_stability_class(service, &report.classification.to_string());
                self.manager.observe_stability(service, &report);
                tracker.observe(report);
                rerun_wanted = tracker.should_rerun_agent();
            }
        }

        match outcome {
            IngestOutcome::Created(id) | IngestOutcome::Merged(id) => {
                if self.manager.needs_root_cause(id) || rerun_wanted {
                    self.request_root_cause(id).await;
                }
            }
            // A re-run can be owed without any detection this cycle, e.g.
            // when stability alone slid into critical while the incident
            // sits in investigating. Route it to whatever is still active
            // for the service.
            IngestOutcome::Ignored if rerun_wanted => {
                for id in self.manager.active_for_service(service) {
                    self.request_root_cause(id).await;
                }
            }
            IngestOutcome::Ignored => {}
        }

        Ok(())
    }

    /// One bounded root-cause attempt; retry bookkeeping lives in the
    /// incident manager, resumed next cycle.
    async fn request_root_cause(&self, id: uuid::Uuid) {
        let incident = match self.manager.get(id) {
            Ok(incident) => incident,
            Err(err) => {
                warn!(incident_id = %id, error = %err, "Incident vanished before analysis");
                return;
            }
        };

        let request = RootCauseRequest {
            incident_id: incident.id,
            service: incident.service.clone(),
            category: incident.category,
            severity: incident.severity,
            evidence: incident.evidence.clone(),
        };

        match self.agent.analyze(&request).await {
            Ok(report) => {
                self.health.set_healthy(components::AGENT_CLIENT);
                if let Err(err) = self.manager.attach_root_cause(id, report) {
                    warn!(incident_id = %id, error = %err, "Could not attach root-cause report");
                }
            }
            Err(err) => {
                self.metrics.inc_agent_failure();
                self.health
                    .set_degraded(components::AGENT_CLIENT, err.to_string());
                match self.manager.record_root_cause_failure(id, &err.to_string()) {
                    Ok(RootCauseState::Unavailable { attempts, .. }) => {
                        warn!(
                            incident_id = %id,
                            attempts,
                            "Root cause marked unavailable"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(incident_id = %id, error = %err, "Failed to record agent failure");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorThresholds;
    use crate::error::SentinelError;
    use crate::health::ComponentStatus;
    use crate::incident::ManagerConfig;
    use crate::ingest::{BufferConfig, Window};
    use crate::models::{
        AnomalyCategory, AnomalyVerdict, IncidentStatus, LogLevel, LogRecord, MetricSample,
        RootCauseReport, Severity,
    };
    use crate::stability::StabilityThresholds;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedAgent {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedAgent {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl RootCauseClient for ScriptedAgent {
        async fn analyze(&self, _request: &RootCauseRequest) -> Result<RootCauseReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SentinelError::AgentUnavailable("scripted outage".to_string()))
            } else {
                Ok(RootCauseReport {
                    summary: "pool exhausted".to_string(),
                    probable_cause: "undersized pool".to_string(),
                    recommended_actions: vec!["restart_service".to_string()],
                    confidence: 0.8,
                })
            }
        }
    }

    fn error_log(service: &str) -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            service: service.to_string(),
            message: "upstream: connection refused".to_string(),
            attributes: HashMap::new(),
        }
    }

    fn info_log(service: &str) -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            service: service.to_string(),
            message: "request served".to_string(),
            attributes: HashMap::new(),
        }
    }

    fn cpu_metric(service: &str, cpu_percent: f64) -> MetricSample {
        MetricSample {
            timestamp: Utc::now(),
            service: service.to_string(),
            cpu_percent: Some(cpu_percent),
            memory_percent: None,
            error_rate: None,
            latency_ms: None,
            custom: HashMap::new(),
        }
    }

    struct Fixture {
        monitor: Arc<Monitor>,
        buffer: Arc<IngestionBuffer>,
        manager: Arc<IncidentManager>,
        stability: Arc<StabilityEvaluator>,
        health: HealthRegistry,
    }

    fn fixture(agent: Arc<dyn RootCauseClient>) -> Fixture {
        let buffer = Arc::new(IngestionBuffer::new(BufferConfig::default()));
        let manager = Arc::new(IncidentManager::new(ManagerConfig::default()));
        let stability = Arc::new(StabilityEvaluator::new(StabilityThresholds::default()));
        let health = HealthRegistry::new();
        let monitor = Arc::new(Monitor::new(
            buffer.clone(),
            AnomalyDetector::new(DetectorThresholds::default()),
            stability.clone(),
            manager.clone(),
            agent,
            MonitorConfig::default(),
            health.clone(),
            StructuredLogger::new("test"),
        ));
        Fixture {
            monitor,
            buffer,
            manager,
            stability,
            health,
        }
    }

    #[tokio::test]
    async fn test_cycle_opens_incident_with_root_cause() {
        let agent = Arc::new(ScriptedAgent::new(false));
        let Fixture {
            monitor,
            buffer,
            manager,
            ..
        } = fixture(agent.clone());

        for _ in 0..40 {
            buffer.append_log(error_log("api")).unwrap();
        }
        for _ in 0..60 {
            buffer.append_log(info_log("api")).unwrap();
        }

        monitor.run_cycle().await;

        let incidents = manager.list(None, 10);
        assert_eq!(incidents.len(), 1);
        // Report arrived, so the incident moved past open
        assert_eq!(incidents[0].status, IncidentStatus::Investigating);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_quiet_window_opens_nothing() {
        let agent = Arc::new(ScriptedAgent::new(false));
        let Fixture {
            monitor,
            buffer,
            manager,
            ..
        } = fixture(agent.clone());

        for _ in 0..20 {
            buffer.append_log(info_log("api")).unwrap();
        }

        monitor.run_cycle().await;

        assert!(manager.list(None, 10).is_empty());
        assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_agent_outage_leaves_incident_open() {
        let agent = Arc::new(ScriptedAgent::new(true));
        let Fixture {
            monitor,
            buffer,
            manager,
            ..
        } = fixture(agent.clone());

        for _ in 0..40 {
            buffer.append_log(error_log("api")).unwrap();
        }

        monitor.run_cycle().await;

        let incidents = manager.list(None, 10);
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].status, IncidentStatus::Open);
        assert!(matches!(incidents[0].root_cause, RootCauseState::Pending));
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_agent_retried_on_later_cycles() {
        let agent = Arc::new(ScriptedAgent::new(true));
        let Fixture {
            monitor, buffer, ..
        } = fixture(agent.clone());

        for _ in 0..40 {
            buffer.append_log(error_log("api")).unwrap();
        }

        monitor.run_cycle().await;
        monitor.run_cycle().await;

        // Second cycle merged the detection and retried the agent
        assert_eq!(agent.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_busy_service_is_skipped() {
        let agent = Arc::new(ScriptedAgent::new(false));
        let Fixture {
            monitor,
            buffer,
            manager,
            ..
        } = fixture(agent);

        for _ in 0..40 {
            buffer.append_log(error_log("api")).unwrap();
        }

        // Simulate a still-running evaluation for this service
        monitor.in_flight.insert("api".to_string(), ());
        monitor.run_cycle().await;
        assert!(manager.list(None, 10).is_empty());

        // Once the slot frees, the next cycle evaluates normally
        monitor.in_flight.remove("api");
        monitor.run_cycle().await;
        assert_eq!(manager.list(None, 10).len(), 1);
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let agent = Arc::new(ScriptedAgent::new(false));
        let Fixture {
            monitor,
            buffer,
            manager,
            ..
        } = fixture(agent);

        for _ in 0..40 {
            buffer.append_log(error_log("api")).unwrap();
        }
        for _ in 0..40 {
            buffer.append_log(error_log("worker")).unwrap();
        }

        monitor.run_cycle().await;

        // Both services got their own incident
        let incidents = manager.list(None, 10);
        assert_eq!(incidents.len(), 2);
        let services: Vec<&str> = incidents.iter().map(|i| i.service.as_str()).collect();
        assert!(services.contains(&"api"));
        assert!(services.contains(&"worker"));
    }

    #[tokio::test]
    async fn test_stability_critical_reruns_agent_without_new_detection() {
        let agent = Arc::new(ScriptedAgent::new(false));
        let Fixture {
            monitor,
            buffer,
            manager,
            stability,
            ..
        } = fixture(agent.clone());

        // An incident already under investigation, report attached
        let verdict = AnomalyVerdict {
            detected: true,
            category: AnomalyCategory::ErrorRate,
            severity: Severity::High,
            title: "Elevated error rate".to_string(),
            description: "error ratio above threshold".to_string(),
            evidence: Vec::new(),
            confidence: 0.9,
        };
        let IngestOutcome::Created(id) = manager.ingest_verdict("api", &verdict) else {
            panic!("expected a fresh incident");
        };
        manager
            .attach_root_cause(
                id,
                RootCauseReport {
                    summary: "pool exhausted".to_string(),
                    probable_cause: "undersized pool".to_string(),
                    recommended_actions: vec!["restart_service".to_string()],
                    confidence: 0.8,
                },
            )
            .unwrap();
        assert_eq!(manager.get(id).unwrap().status, IncidentStatus::Investigating);

        // Baseline cpu at 10%, current window at 45%: critical deviation,
        // while the window itself trips no detector threshold
        let now = Utc::now();
        stability.set_baseline(&Window {
            start: now - chrono::Duration::minutes(5),
            end: now,
            logs: Vec::new(),
            metrics: vec![cpu_metric("api", 10.0)],
        });
        buffer.append_metric(cpu_metric("api", 45.0)).unwrap();

        monitor.run_cycle().await;

        // The slide into critical alone re-runs the analysis
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cycle_reports_component_health() {
        let agent = Arc::new(ScriptedAgent::new(false));
        let Fixture {
            monitor,
            buffer,
            health,
            ..
        } = fixture(agent);

        for _ in 0..40 {
            buffer.append_log(error_log("api")).unwrap();
        }

        monitor.run_cycle().await;

        let snapshot = health.health();
        assert_eq!(snapshot.status, ComponentStatus::Healthy);
        assert_eq!(
            snapshot.components[components::MONITOR].status,
            ComponentStatus::Healthy
        );
        assert_eq!(
            snapshot.components[components::BUFFER].status,
            ComponentStatus::Healthy
        );
        assert_eq!(
            snapshot.components[components::AGENT_CLIENT].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_agent_outage_degrades_agent_health() {
        let agent = Arc::new(ScriptedAgent::new(true));
        let Fixture {
            monitor,
            buffer,
            health,
            ..
        } = fixture(agent);

        for _ in 0..40 {
            buffer.append_log(error_log("api")).unwrap();
        }

        monitor.run_cycle().await;

        let snapshot = health.health();
        assert_eq!(snapshot.status, ComponentStatus::Degraded);
        assert_eq!(
            snapshot.components[components::AGENT_CLIENT].status,
            ComponentStatus::Degraded
        );
    }
}
