//! Sentinel library for incident response
//!
//! This crate provides the core functionality for:
//! - Log and metric ingestion with bounded retention
//! - Rule and pattern based anomaly detection
//! - Incident lifecycle management with deduplication
//! - Stability evaluation against operator baselines
//! - Root-cause analysis via an external reasoning service
//! - Auto-heal execution with dry-run and audit
//! - Health checks and observability

pub mod autoheal;
pub mod detector;
pub mod error;
pub mod health;
pub mod incident;
pub mod ingest;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod rootcause;
pub mod stability;

pub use error::{Result, SentinelError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SentinelMetrics, StructuredLogger};
