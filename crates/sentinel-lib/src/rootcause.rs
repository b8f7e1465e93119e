//! Client for the external root-cause reasoning service
//!
//! The service receives an incident's evidence bundle and returns a
//! structured report. Every call is bounded: request timeout, a fixed retry
//! budget with exponential backoff, and a terminal error that the incident
//! manager records rather than crashes on.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Result, SentinelError};
use crate::models::{RootCauseReport, RootCauseRequest};

/// Configuration for the reasoning-service client
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    /// Analysis endpoint URL (e.g. "http://reasoner:9400/v1/analyze")
    pub endpoint: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Retries within a single `analyze` call
    pub attempts_per_call: u32,
    /// Initial backoff between in-call retries
    pub initial_backoff: Duration,
    /// Maximum backoff between in-call retries
    pub max_backoff: Duration,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9400/v1/analyze".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            attempts_per_call: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Seam for the remote reasoning call, mockable in tests
#[async_trait]
pub trait RootCauseClient: Send + Sync {
    async fn analyze(&self, request: &RootCauseRequest) -> Result<RootCauseReport>;
}

/// HTTP client posting evidence bundles to the reasoning service
pub struct HttpRootCauseClient {
    config: AgentClientConfig,
    http: reqwest::Client,
}

impl HttpRootCauseClient {
    pub fn new(config: AgentClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| SentinelError::AgentUnavailable(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn post_once(&self, request: &RootCauseRequest) -> Result<RootCauseReport> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| SentinelError::AgentUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SentinelError::AgentUnavailable(format!(
                "reasoning service returned {}",
                response.status()
            )));
        }

        response
            .json::<RootCauseReport>()
            .await
            .map_err(|e| SentinelError::AgentUnavailable(format!("malformed report: {}", e)))
    }
}

#[async_trait]
impl RootCauseClient for HttpRootCauseClient {
    async fn analyze(&self, request: &RootCauseRequest) -> Result<RootCauseReport> {
        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 1..=self.config.attempts_per_call.max(1) {
            match self.post_once(request).await {
                Ok(report) => {
                    debug!(
                        incident_id = %request.incident_id,
                        confidence = report.confidence,
                        "root-cause report received"
                    );
                    return Ok(report);
                }
                Err(err) => {
                    warn!(
                        incident_id = %request.incident_id,
                        attempt,
                        error = %err,
                        "root-cause call failed"
                    );
                    last_error = Some(err);
                    if attempt < self.config.attempts_per_call {
                        tokio::time::sleep(backoff).await;
                        backoff = std::cmp::min(backoff * 2, self.config.max_backoff);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SentinelError::AgentUnavailable("no attempt executed".to_string())
        }))
    }
}
