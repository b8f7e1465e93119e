//! Observability infrastructure for the sentinel daemon
//!
//! Provides:
//! - Prometheus metrics (cycle latency, buffer occupancy, incident counts)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for evaluation-cycle latency (in seconds)
const CYCLE_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct SentinelMetricsInner {
    cycle_latency_seconds: Histogram,
    buffer_log_records: IntGauge,
    buffer_metric_samples: IntGauge,
    ingested_records: IntCounterVec,
    rejected_records: IntCounter,
    detections: IntCounterVec,
    incidents_active: IntGauge,
    agent_failures: IntCounter,
    remediations: IntCounterVec,
    scope_errors: IntCounter,
    scopes_skipped_busy: IntCounter,
    stability_class_info: GaugeVec,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "sentinel_cycle_latency_seconds",
                "Time spent running one evaluation cycle",
                CYCLE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            buffer_log_records: register_int_gauge!(
                "sentinel_buffer_log_records",
                "Log records currently retained in the ingestion buffer"
            )
            .expect("Failed to register buffer_log_records"),

            buffer_metric_samples: register_int_gauge!(
                "sentinel_buffer_metric_samples",
                "Metric samples currently retained in the ingestion buffer"
            )
            .expect("Failed to register buffer_metric_samples"),

            ingested_records: register_int_counter_vec!(
                "sentinel_ingested_records_total",
                "Records accepted by the ingestion surface",
                &["kind"]
            )
            .expect("Failed to register ingested_records"),

            rejected_records: register_int_counter!(
                "sentinel_rejected_records_total",
                "Records rejected by ingestion validation"
            )
            .expect("Failed to register rejected_records"),

            detections: register_int_counter_vec!(
                "sentinel_detections_total",
                "Anomaly verdicts with detected=true, by category",
                &["category"]
            )
            .expect("Failed to register detections"),

            incidents_active: register_int_gauge!(
                "sentinel_incidents_active",
                "Incidents currently in a non-terminal, non-resolved state"
            )
            .expect("Failed to register incidents_active"),

            agent_failures: register_int_counter!(
                "sentinel_agent_failures_total",
                "Failed calls to the root-cause reasoning service"
            )
            .expect("Failed to register agent_failures"),

            remediations: register_int_counter_vec!(
                "sentinel_remediations_total",
                "Heal-action executions, by action and dry-run flag",
                &["action", "dry_run"]
            )
            .expect("Failed to register remediations"),

            scope_errors: register_int_counter!(
                "sentinel_scope_errors_total",
                "Evaluation-scope failures isolated during a cycle"
            )
            .expect("Failed to register scope_errors"),

            scopes_skipped_busy: register_int_counter!(
                "sentinel_scopes_skipped_busy_total",
                "Per-service evaluations skipped because one was in flight"
            )
            .expect("Failed to register scopes_skipped_busy"),

            stability_class_info: register_gauge_vec!(
                "sentinel_stability_class_info",
                "Latest stability classification per service",
                &["service", "classification"]
            )
            .expect("Failed to register stability_class_info"),
        }
    }
}

/// Sentinel metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct SentinelMetrics {
    // This is just a marker - we use the global instance
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record an evaluation-cycle latency observation
    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    /// Update buffer occupancy gauges
    pub fn set_buffer_occupancy(&self, log_records: i64, metric_samples: i64) {
        self.inner().buffer_log_records.set(log_records);
        self.inner().buffer_metric_samples.set(metric_samples);
    }

    /// Count an accepted ingestion record
    pub fn inc_ingested(&self, kind: &str) {
        self.inner().ingested_records.with_label_values(&[kind]).inc();
    }

    /// Count a record rejected by validation
    pub fn inc_rejected(&self) {
        self.inner().rejected_records.inc();
    }

    /// Count a positive anomaly verdict
    pub fn inc_detection(&self, category: &str) {
        self.inner().detections.with_label_values(&[category]).inc();
    }

    /// Update the active incident gauge
    pub fn set_incidents_active(&self, count: i64) {
        self.inner().incidents_active.set(count);
    }

    /// Count a failed root-cause call
    pub fn inc_agent_failure(&self) {
        self.inner().agent_failures.inc();
    }

    /// Count an executed (or simulated) heal action
    pub fn inc_remediation(&self, action: &str, dry_run: bool) {
        let flag = if dry_run { "true" } else { "false" };
        self.inner().remediations.with_label_values(&[action, flag]).inc();
    }

    /// Count a scope-isolated evaluation failure
    pub fn inc_scope_error(&self) {
        self.inner().scope_errors.inc();
    }

    /// Count a skip caused by an in-flight evaluation for the same service
    pub fn inc_scope_skipped_busy(&self) {
        self.inner().scopes_skipped_busy.inc();
    }

    /// Publish the latest stability classification for a service
    pub fn set_stability_class(&self, service: &str, classification: &str) {
        let gauge = &self.inner().stability_class_info;
        for class in ["stable", "improving", "degrading", "critical"] {
            gauge
                .with_label_values(&[service, class])
                .set(if class == classification { 1.0 } else { 0.0 });
        }
    }
}

/// Structured logger for incident lifecycle events
///
/// Provides consistent JSON-formatted logging for detections, incidents,
/// and remediation actions.
#[derive(Clone)]
pub struct StructuredLogger {
    instance_name: String,
}

impl StructuredLogger {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
        }
    }

    /// Log a positive anomaly verdict
    pub fn log_detection(
        &self,
        service: &str,
        category: &str,
        severity: &str,
        confidence: f64,
        title: &str,
    ) {
        match severity {
            "critical" => {
                warn!(
                    event = "anomaly_detected",
                    instance = %self.instance_name,
                    service = %service,
                    category = %category,
                    severity = %severity,
                    confidence = confidence,
                    title = %title,
                    "Critical anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    instance = %self.instance_name,
                    service = %service,
                    category = %category,
                    severity = %severity,
                    confidence = confidence,
                    title = %title,
                    "Anomaly detected"
                );
            }
        }
    }

    /// Log an incident lifecycle change
    pub fn log_incident(
        &self,
        incident_id: &str,
        service: &str,
        status: &str,
        severity: &str,
        detection_count: u32,
    ) {
        info!(
            event = "incident_lifecycle",
            instance = %self.instance_name,
            incident_id = %incident_id,
            service = %service,
            status = %status,
            severity = %severity,
            detection_count = detection_count,
            "Incident lifecycle change"
        );
    }

    /// Log a remediation execution, dry-run or real
    pub fn log_remediation(
        &self,
        action: &str,
        target: &str,
        dry_run: bool,
        success: bool,
        message: &str,
    ) {
        if success {
            info!(
                event = "remediation_executed",
                instance = %self.instance_name,
                action = %action,
                target = %target,
                dry_run = dry_run,
                message = %message,
                "Remediation executed"
            );
        } else {
            warn!(
                event = "remediation_failed",
                instance = %self.instance_name,
                action = %action,
                target = %target,
                dry_run = dry_run,
                message = %message,
                "Remediation failed"
            );
        }
    }

    /// Log daemon startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "sentinel_started",
            instance = %self.instance_name,
            version = %version,
            "Sentinel daemon started"
        );
    }

    /// Log daemon shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "sentinel_shutdown",
            instance = %self.instance_name,
            reason = %reason,
            "Sentinel daemon shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_metrics_creation() {
        // Note: This test may fail if run multiple times in the same process
        // due to Prometheus global registry. In practice, metrics are created once.
        let metrics = SentinelMetrics::new();

        metrics.observe_cycle_latency(0.05);
        metrics.set_buffer_occupancy(120, 40);
        metrics.inc_ingested("log");
        metrics.inc_detection("error_rate");
        metrics.set_incidents_active(2);
        metrics.inc_remediation("restart_service", true);
        metrics.set_stability_class("api", "degrading");
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("sentinel-1");
        assert_eq!(logger.instance_name, "sentinel-1");
    }
}
