//! Component health tracking behind the daemon's probe endpoints
//!
//! Components report in from wherever they run (the monitor cycle, the
//! agent client, the API handlers); none of the setters block or await,
//! so hot paths can report freely.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Health status of a component, ordered best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Experiencing issues but still operational
    Degraded,
    Unhealthy,
}

/// Latest report from one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn report(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            checked_at: Utc::now(),
        }
    }
}

/// Overall health response served by `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Readiness response served by `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const BUFFER: &str = "buffer";
    pub const DETECTOR: &str = "detector";
    pub const AGENT_CLIENT: &str = "agent_client";
    pub const AUTOHEAL: &str = "autoheal";
    pub const MONITOR: &str = "monitor";
}

/// Shared registry of component reports plus the readiness latch
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<DashMap<String, ComponentHealth>>,
    ready: Arc<AtomicBool>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component, starting healthy
    pub fn register(&self, name: &str) {
        self.set_healthy(name);
    }

    pub fn set_healthy(&self, name: &str) {
        self.components.insert(
            name.to_string(),
            ComponentHealth::report(ComponentStatus::Healthy, None),
        );
    }

    pub fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.components.insert(
            name.to_string(),
            ComponentHealth::report(ComponentStatus::Degraded, Some(message.into())),
        );
    }

    pub fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.components.insert(
            name.to_string(),
            ComponentHealth::report(ComponentStatus::Unhealthy, Some(message.into())),
        );
    }

    /// Flip the readiness latch; startup wiring sets this once complete
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Snapshot all component reports; overall status is the worst one
    pub fn health(&self) -> HealthResponse {
        let components: HashMap<String, ComponentHealth> = self
            .components
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let status = components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse { status, components }
    }

    pub fn readiness(&self) -> ReadinessResponse {
        if !self.ready.load(Ordering::SeqCst) {
            return ReadinessResponse {
                ready: false,
                reason: Some("Sentinel not yet initialized".to_string()),
            };
        }

        // Ready tolerates degraded components but not failed ones
        if self.health().status == ComponentStatus::Unhealthy {
            return ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            };
        }

        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_is_healthy() {
        let registry = HealthRegistry::new();
        let health = registry.health();

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[test]
    fn test_registered_component_starts_healthy() {
        let registry = HealthRegistry::new();
        registry.register(components::MONITOR);

        let health = registry.health();
        assert_eq!(
            health.components[components::MONITOR].status,
            ComponentStatus::Healthy
        );
    }

    #[test]
    fn test_worst_component_dominates_overall_status() {
        let registry = HealthRegistry::new();
        registry.register(components::BUFFER);
        registry.register(components::AGENT_CLIENT);

        registry.set_degraded(components::AGENT_CLIENT, "reasoning service slow");
        assert_eq!(registry.health().status, ComponentStatus::Degraded);

        registry.set_unhealthy(components::BUFFER, "eviction failure");
        assert_eq!(registry.health().status, ComponentStatus::Unhealthy);
    }

    #[test]
    fn test_recovery_clears_degraded_report() {
        let registry = HealthRegistry::new();
        registry.register(components::AGENT_CLIENT);
        registry.set_degraded(components::AGENT_CLIENT, "timeout");

        registry.set_healthy(components::AGENT_CLIENT);
        let health = registry.health();
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components[components::AGENT_CLIENT].message.is_none());
    }

    #[test]
    fn test_readiness_requires_the_latch() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness();
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());

        registry.set_ready(true);
        assert!(registry.readiness().ready);
    }

    #[test]
    fn test_readiness_tolerates_degraded_but_not_unhealthy() {
        let registry = HealthRegistry::new();
        registry.register(components::BUFFER);
        registry.set_ready(true);

        registry.set_degraded(components::BUFFER, "near capacity");
        assert!(registry.readiness().ready);

        registry.set_unhealthy(components::BUFFER, "poisoned");
        assert!(!registry.readiness().ready);
    }
}
