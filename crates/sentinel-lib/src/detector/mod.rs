//! Anomaly detection over ingestion windows
//!
//! This module decides when a window of logs and metrics looks wrong enough
//! to open an incident:
//! - Threshold checks on error rate, CPU, memory, and latency
//! - Known failure-pattern matching on error/critical log messages
//! - Deterministic category tie-breaking at equal severity

mod engine;
mod patterns;

pub use engine::{AnomalyDetector, DetectorThresholds, CATEGORY_PRIORITY};
pub use patterns::{FailurePattern, PatternHit, match_failure_patterns, KNOWN_PATTERNS};
