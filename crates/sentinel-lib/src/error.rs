//! Error taxonomy for the sentinel core
//!
//! Failures local to one monitored scope or one incident must never abort
//! evaluation of the others, so every variant here is designed to be
//! recorded and surfaced rather than propagated as a crash.

use crate::models::IncidentStatus;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the sentinel core components
#[derive(Debug, Error)]
pub enum SentinelError {
    /// Malformed record rejected at the ingestion boundary
    #[error("validation failed: {0}")]
    Validation(String),

    /// Detector could not evaluate a window; the cycle skips that scope
    #[error("detection failed: {0}")]
    Detection(String),

    /// Root-cause agent call failed or timed out; retried with backoff
    #[error("root-cause agent unavailable: {0}")]
    AgentUnavailable(String),

    /// Remediation action failed; captured in the audit record
    #[error("remediation failed: {0}")]
    Remediation(String),

    /// Operator command requested a transition the state machine forbids
    #[error("invalid incident transition: {from} -> {to}")]
    InvalidTransition {
        from: IncidentStatus,
        to: IncidentStatus,
    },

    #[error("incident not found: {0}")]
    IncidentNotFound(Uuid),
}

pub type Result<T> = std::result::Result<T, SentinelError>;
