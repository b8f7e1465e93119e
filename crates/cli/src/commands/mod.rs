//! CLI command implementations

pub mod heal;
pub mod incidents;
pub mod status;
