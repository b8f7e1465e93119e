//! Sentinel daemon configuration

use anyhow::Result;
use serde::Deserialize;

/// Daemon configuration, overridable via SENTINEL_* environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    /// Instance name carried on structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Evaluation cycle interval in seconds
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Window duration handed to the detector each cycle, in seconds
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// Buffer retention ceiling by age, in seconds
    #[serde(default = "default_retention")]
    pub buffer_retention_secs: u64,

    /// Buffer retention ceiling by count, per record kind
    #[serde(default = "default_max_records")]
    pub buffer_max_records: usize,

    /// Root-cause reasoning service endpoint
    #[serde(default = "default_agent_endpoint")]
    pub agent_endpoint: String,

    /// Per-request timeout for the reasoning service, in seconds
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_secs: u64,

    /// Root-cause failures tolerated before marking unavailable
    #[serde(default = "default_max_agent_retries")]
    pub max_agent_retries: u32,

    /// Remediation dry-run flag; defaults to simulation-only
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    /// Consecutive stable cycles before auto-resolution
    #[serde(default = "default_resolve_stable_cycles")]
    pub resolve_stable_cycles: u32,

    /// Consecutive degrading cycles before a root-cause re-run
    #[serde(default = "default_rerun_degrading_cycles")]
    pub rerun_degrading_cycles: u32,

    /// Log-derived error ratio threshold (0.0..1.0)
    #[serde(default = "default_log_error_ratio")]
    pub log_error_ratio: f64,

    /// Reported error-rate metric threshold (0.0..1.0)
    #[serde(default = "default_metric_error_rate")]
    pub metric_error_rate: f64,

    /// CPU percentage threshold
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: f64,

    /// Memory percentage threshold
    #[serde(default = "default_memory_percent")]
    pub memory_percent: f64,

    /// Latency ceiling in milliseconds
    #[serde(default = "default_latency_ms")]
    pub latency_ms: f64,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "sentinel".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_cycle_interval() -> u64 {
    300
}

fn default_window() -> u64 {
    300
}

fn default_retention() -> u64 {
    3600
}

fn default_max_records() -> usize {
    10_000
}

fn default_agent_endpoint() -> String {
    "http://localhost:9400/v1/analyze".to_string()
}

fn default_agent_timeout() -> u64 {
    30
}

fn default_max_agent_retries() -> u32 {
    5
}

fn default_dry_run() -> bool {
    true
}

fn default_resolve_stable_cycles() -> u32 {
    3
}

fn default_rerun_degrading_cycles() -> u32 {
    2
}

fn default_log_error_ratio() -> f64 {
    0.20
}

fn default_metric_error_rate() -> f64 {
    0.05
}

fn default_cpu_percent() -> f64 {
    85.0
}

fn default_memory_percent() -> f64 {
    90.0
}

fn default_latency_ms() -> f64 {
    2000.0
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            cycle_interval_secs: default_cycle_interval(),
            window_secs: default_window(),
            buffer_retention_secs: default_retention(),
            buffer_max_records: default_max_records(),
            agent_endpoint: default_agent_endpoint(),
            agent_timeout_secs: default_agent_timeout(),
            max_agent_retries: default_max_agent_retries(),
            dry_run: default_dry_run(),
            resolve_stable_cycles: default_resolve_stable_cycles(),
            rerun_degrading_cycles: default_rerun_degrading_cycles(),
            log_error_ratio: default_log_error_ratio(),
            metric_error_rate: default_metric_error_rate(),
            cpu_percent: default_cpu_percent(),
            memory_percent: default_memory_percent(),
            latency_ms: default_latency_ms(),
        }
    }
}

impl SentinelConfig {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SENTINEL"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}
