//! Platform adapters that carry out real remediation operations

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Result, SentinelError};
use crate::models::HealAction;

/// Default ceiling on a single platform command
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

/// Seam between the executor and the target runtime platform.
///
/// The executor counts on this being the only side-effecting path; dry-run
/// mode never calls it.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Perform the operation, returning a human-readable outcome message
    async fn apply(
        &self,
        action: HealAction,
        target: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<String>;
}

/// Adapter that shells out to platform tooling
pub struct CommandAdapter {
    timeout: Duration,
}

impl CommandAdapter {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the platform command line for an action
    fn command_for(
        action: HealAction,
        target: &str,
        parameters: &HashMap<String, String>,
    ) -> (String, Vec<String>) {
        match action {
            HealAction::RestartService => (
                "systemctl".to_string(),
                vec!["restart".to_string(), target.to_string()],
            ),
            HealAction::ScaleReplicas => {
                let replicas = parameters
                    .get("replicas")
                    .cloned()
                    .unwrap_or_else(|| "2".to_string());
                (
                    "kubectl".to_string(),
                    vec![
                        "scale".to_string(),
                        format!("deployment/{}", target),
                        format!("--replicas={}", replicas),
                    ],
                )
            }
            HealAction::FlushCache => (
                "redis-cli".to_string(),
                vec!["-h".to_string(), target.to_string(), "FLUSHALL".to_string()],
            ),
            HealAction::ClearQueue => {
                let queue = parameters
                    .get("queue")
                    .cloned()
                    .unwrap_or_else(|| "default".to_string());
                (
                    "rabbitmqadmin".to_string(),
                    vec![
                        format!("--host={}", target),
                        "purge".to_string(),
                        "queue".to_string(),
                        format!("name={}", queue),
                    ],
                )
            }
            HealAction::RerouteTraffic => (
                "nginx".to_string(),
                vec!["-s".to_string(), "reload".to_string()],
            ),
            HealAction::RollbackDeployment => (
                "kubectl".to_string(),
                vec![
                    "rollout".to_string(),
                    "undo".to_string(),
                    format!("deployment/{}", target),
                ],
            ),
            HealAction::ClearDisk => {
                let path = parameters
                    .get("path")
                    .cloned()
                    .unwrap_or_else(|| "/tmp".to_string());
                (
                    "find".to_string(),
                    vec![
                        path,
                        "-type".to_string(),
                        "f".to_string(),
                        "-mtime".to_string(),
                        "+7".to_string(),
                        "-delete".to_string(),
                    ],
                )
            }
            HealAction::KillProcess => {
                let pid = parameters.get("pid").cloned().unwrap_or_default();
                ("kill".to_string(), vec!["-TERM".to_string(), pid])
            }
        }
    }
}

impl Default for CommandAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformAdapter for CommandAdapter {
    async fn apply(
        &self,
        action: HealAction,
        target: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<String> {
        let (program, args) = Self::command_for(action, target, parameters);
        debug!(action = %action, target = %target, program = %program, "running platform command");

        let child = tokio::process::Command::new(&program)
            .args(&args)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                SentinelError::Remediation(format!(
                    "{} timed out after {}s",
                    program,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| SentinelError::Remediation(format!("{} failed to start: {}", program, e)))?;

        if output.status.success() {
            info!(action = %action, target = %target, "platform command succeeded");
            Ok(format!("{} completed on {}", action, target))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(SentinelError::Remediation(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )))
        }
    }
}
