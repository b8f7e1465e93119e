//! Heal-action execution and the append-only audit trail

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::adapters::PlatformAdapter;
use crate::models::{HealAction, RemediationRecord};

/// Human-readable statement of what an action does to a target
pub fn describe_action(
    action: HealAction,
    target: &str,
    parameters: &HashMap<String, String>,
) -> String {
    match action {
        HealAction::RestartService => format!("restart service {}", target),
        HealAction::ScaleReplicas => {
            let replicas = parameters.get("replicas").map(String::as_str).unwrap_or("2");
            format!("scale {} to {} replicas", target, replicas)
        }
        HealAction::FlushCache => format!("flush cache on {}", target),
        HealAction::ClearQueue => {
            let queue = parameters.get("queue").map(String::as_str).unwrap_or("default");
            format!("clear queue {} on {}", queue, target)
        }
        HealAction::RerouteTraffic => format!("reroute traffic away from {}", target),
        HealAction::RollbackDeployment => format!("roll back deployment {}", target),
        HealAction::ClearDisk => {
            let path = parameters.get("path").map(String::as_str).unwrap_or("/tmp");
            format!("clear old files under {} on {}", path, target)
        }
        HealAction::KillProcess => {
            let pid = parameters.get("pid").map(String::as_str).unwrap_or("?");
            format!("kill process {} on {}", pid, target)
        }
    }
}

/// Append-only store of remediation records.
///
/// Records are never mutated or removed after insertion.
#[derive(Default)]
pub struct AuditLog {
    records: RwLock<Vec<RemediationRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: RemediationRecord) {
        if let Ok(mut records) = self.records.write() {
            records.push(record);
        }
    }

    /// Most recent entries first, up to `limit`
    pub fn entries(&self, limit: usize) -> Vec<RemediationRecord> {
        self.records
            .read()
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Executes heal actions against the platform, honoring dry-run.
///
/// The dry-run flag is passed per call rather than read from ambient state
/// so callers and tests control it without cross-contamination.
pub struct AutoHealExecutor {
    adapter: Arc<dyn PlatformAdapter>,
    audit: Arc<AuditLog>,
}

impl AutoHealExecutor {
    pub fn new(adapter: Arc<dyn PlatformAdapter>, audit: Arc<AuditLog>) -> Self {
        Self { adapter, audit }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Execute one action against one target.
    ///
    /// With dry_run=true this performs no external effect and always
    /// succeeds; with dry_run=false the adapter's outcome, including
    /// failure, is captured in the returned record rather than propagated.
    /// Every invocation lands in the audit log.
    pub async fn execute(
        &self,
        action: HealAction,
        target: &str,
        parameters: HashMap<String, String>,
        dry_run: bool,
        incident_id: Option<Uuid>,
    ) -> RemediationRecord {
        let (success, message) = if dry_run {
            let message = format!("[DRY RUN] Would {}", describe_action(action, target, &parameters));
            info!(action = %action, target = %target, "dry-run remediation recorded");
            (true, message)
        } else {
            match self.adapter.apply(action, target, &parameters).await {
                Ok(message) => {
                    info!(action = %action, target = %target, "remediation succeeded");
                    (true, message)
                }
                Err(err) => {
                    warn!(action = %action, target = %target, error = %err, "remediation failed");
                    (false, err.to_string())
                }
            }
        };

        let record = RemediationRecord {
            id: Uuid::new_v4(),
            action,
            target: target.to_string(),
            parameters,
            dry_run,
            success,
            message,
            executed_at: Utc::now(),
            incident_id,
        };
        self.audit.append(record.clone());
        record
    }
}
