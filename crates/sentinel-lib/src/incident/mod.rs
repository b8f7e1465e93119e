//! Incident lifecycle management
//!
//! The state manager is the single writer of incident records:
//! - Folds repeated detections for the same (category, service) key into
//!   one open incident
//! - Enforces the lifecycle state machine on operator commands
//! - Tracks root-cause retries and auto-resolution from stability signals
//! - Broadcasts notification events on creation and every transition

mod manager;

pub use manager::{IncidentManager, IngestOutcome, ManagerConfig};
