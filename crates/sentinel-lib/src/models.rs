//! Core data models for the incident sentinel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Log severity level of an ingested record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Records below error level never contribute to detection
    pub fn is_failure(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Critical)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Incident severity, ordered low to critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Anomaly category classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyCategory {
    ErrorRate,
    ResourceExhaustion,
    Latency,
    DependencyFailure,
    PatternMatch,
    Other,
}

impl std::fmt::Display for AnomalyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyCategory::ErrorRate => write!(f, "error_rate"),
            AnomalyCategory::ResourceExhaustion => write!(f, "resource_exhaustion"),
            AnomalyCategory::Latency => write!(f, "latency"),
            AnomalyCategory::DependencyFailure => write!(f, "dependency_failure"),
            AnomalyCategory::PatternMatch => write!(f, "pattern_match"),
            AnomalyCategory::Other => write!(f, "other"),
        }
    }
}

/// A single ingested log record, immutable once buffered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub service: String,
    pub message: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// A single ingested metric sample, immutable once buffered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub custom: HashMap<String, f64>,
}

/// Reference to a record that contributed to a verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceRecord {
    Log(LogRecord),
    Metric(MetricSample),
}

impl EvidenceRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EvidenceRecord::Log(l) => l.timestamp,
            EvidenceRecord::Metric(m) => m.timestamp,
        }
    }
}

/// Verdict produced by one detector invocation, immutable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub detected: bool,
    pub category: AnomalyCategory,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub evidence: Vec<EvidenceRecord>,
    pub confidence: f64,
}

impl AnomalyVerdict {
    /// Verdict for a quiet window
    pub fn clear() -> Self {
        Self {
            detected: false,
            category: AnomalyCategory::Other,
            severity: Severity::Low,
            title: String::new(),
            description: String::new(),
            evidence: Vec::new(),
            confidence: 0.0,
        }
    }
}

/// Incident lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Investigating,
    Resolved,
    Closed,
}

impl IncidentStatus {
    /// True while the incident still folds new detections into itself
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            IncidentStatus::Open | IncidentStatus::Acknowledged | IncidentStatus::Investigating
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Closed)
    }

    /// Whether the lifecycle state machine allows a transition.
    ///
    /// Forward path is open -> acknowledged -> investigating -> resolved ->
    /// closed, with a direct open -> closed dismissal for false positives.
    pub fn can_transition(&self, to: IncidentStatus) -> bool {
        use IncidentStatus::*;
        matches!(
            (self, to),
            (Open, Acknowledged)
                | (Open, Investigating)
                | (Open, Closed)
                | (Acknowledged, Investigating)
                | (Acknowledged, Resolved)
                | (Investigating, Resolved)
                | (Resolved, Closed)
        )
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentStatus::Open => write!(f, "open"),
            IncidentStatus::Acknowledged => write!(f, "acknowledged"),
            IncidentStatus::Investigating => write!(f, "investigating"),
            IncidentStatus::Resolved => write!(f, "resolved"),
            IncidentStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Key used to fold repeated detections into one open incident
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub category: AnomalyCategory,
    pub service: String,
}

impl DedupKey {
    pub fn new(category: AnomalyCategory, service: impl Into<String>) -> Self {
        Self {
            category,
            service: service.into(),
        }
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.category, self.service)
    }
}

/// Root-cause analysis state attached to an incident
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RootCauseState {
    /// No report yet; the manager will request one
    Pending,
    /// Structured report returned by the reasoning service
    Available { report: RootCauseReport },
    /// Retries exhausted; the state machine proceeds without a report
    Unavailable { attempts: u32, last_error: String },
}

/// Structured output from the external reasoning service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseReport {
    pub summary: String,
    pub probable_cause: String,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

/// Evidence bundle sent to the reasoning service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseRequest {
    pub incident_id: Uuid,
    pub service: String,
    pub category: AnomalyCategory,
    pub severity: Severity,
    pub evidence: Vec<EvidenceRecord>,
}

/// The central incident entity, owned by the state manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: AnomalyCategory,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub service: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub root_cause: RootCauseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
    pub evidence: Vec<EvidenceRecord>,
    /// Detections folded into this incident, including the first
    pub detection_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.category, self.service.clone())
    }
}

/// Compact incident view for dashboards and reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub id: Uuid,
    pub title: String,
    pub service: String,
    pub category: AnomalyCategory,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
    pub duration_minutes: f64,
    pub detection_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probable_cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
}

/// Health classification produced by the stability evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityClass {
    Stable,
    Improving,
    Degrading,
    Critical,
}

impl std::fmt::Display for StabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StabilityClass::Stable => write!(f, "stable"),
            StabilityClass::Improving => write!(f, "improving"),
            StabilityClass::Degrading => write!(f, "degrading"),
            StabilityClass::Critical => write!(f, "critical"),
        }
    }
}

/// Snapshot comparison of current metrics against the baseline.
///
/// Recomputed fresh each evaluation; classification is a pure function of
/// window and baseline, never of incident state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityReport {
    pub classification: StabilityClass,
    /// Relative deviation from baseline per tracked metric
    pub baseline_deltas: HashMap<String, f64>,
    pub evaluated_at: DateTime<Utc>,
}

/// Operator-set reference values for stability comparison
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Baseline {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_at: Option<DateTime<Utc>>,
}

impl Baseline {
    /// Look up a tracked metric by its wire name
    pub fn value(&self, name: &str) -> Option<f64> {
        match name {
            "cpu_percent" => self.cpu_percent,
            "memory_percent" => self.memory_percent,
            "error_rate" => self.error_rate,
            "latency_ms" => self.latency_ms,
            _ => None,
        }
    }
}

/// Enumerated remediation actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealAction {
    RestartService,
    ScaleReplicas,
    FlushCache,
    ClearQueue,
    RerouteTraffic,
    RollbackDeployment,
    ClearDisk,
    KillProcess,
}

impl std::fmt::Display for HealAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealAction::RestartService => write!(f, "restart_service"),
            HealAction::ScaleReplicas => write!(f, "scale_replicas"),
            HealAction::FlushCache => write!(f, "flush_cache"),
            HealAction::ClearQueue => write!(f, "clear_queue"),
            HealAction::RerouteTraffic => write!(f, "reroute_traffic"),
            HealAction::RollbackDeployment => write!(f, "rollback_deployment"),
            HealAction::ClearDisk => write!(f, "clear_disk"),
            HealAction::KillProcess => write!(f, "kill_process"),
        }
    }
}

impl std::str::FromStr for HealAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "restart_service" => Ok(HealAction::RestartService),
            "scale_replicas" => Ok(HealAction::ScaleReplicas),
            "flush_cache" => Ok(HealAction::FlushCache),
            "clear_queue" => Ok(HealAction::ClearQueue),
            "reroute_traffic" => Ok(HealAction::RerouteTraffic),
            "rollback_deployment" => Ok(HealAction::RollbackDeployment),
            "clear_disk" => Ok(HealAction::ClearDisk),
            "kill_process" => Ok(HealAction::KillProcess),
            other => Err(format!("unknown heal action: {}", other)),
        }
    }
}

/// Append-only audit entry for one executor invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationRecord {
    pub id: Uuid,
    pub action: HealAction,
    pub target: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    pub dry_run: bool,
    pub success: bool,
    pub message: String,
    pub executed_at: DateTime<Utc>,
    /// None means operator-initiated with no triggering incident
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<Uuid>,
}

/// Kind of lifecycle change carried by a notification event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncidentEventKind {
    Created,
    Merged { detection_count: u32 },
    Transitioned { from: IncidentStatus },
}

/// Notification event fired on incident creation and state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub incident_id: Uuid,
    pub service: String,
    pub title: String,
    pub status: IncidentStatus,
    pub severity: Severity,
    pub event: IncidentEventKind,
    pub at: DateTime<Utc>,
}
