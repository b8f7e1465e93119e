//! Daemon wiring: configuration and the HTTP API surface

pub mod api;
pub mod config;
