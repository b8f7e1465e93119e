//! Remediation execution with a global dry-run safety mode
//!
//! Handles:
//! - Mapping enumerated heal actions onto platform operations
//! - Dry-run simulation that records intent without side effects
//! - An append-only audit log, authoritative for what happened and for
//!   what would have happened

mod adapters;
mod executor;

pub use adapters::{CommandAdapter, PlatformAdapter};
pub use executor::{AuditLog, AutoHealExecutor, describe_action};
