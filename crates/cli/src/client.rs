//! API client for communicating with the sentinel daemon

use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the sentinel daemon
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .put(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub severity: String,
    pub status: String,
    pub service: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub root_cause: RootCauseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
    pub detection_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RootCauseState {
    Pending,
    Available { report: RootCauseReport },
    Unavailable { attempts: u32, last_error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseReport {
    pub summary: String,
    pub probable_cause: String,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub id: String,
    pub title: String,
    pub service: String,
    pub category: String,
    pub severity: String,
    pub status: String,
    pub created_at: String,
    pub duration_minutes: f64,
    pub detection_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probable_cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunState {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub action: String,
    pub target: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationRecord {
    pub id: String,
    pub action: String,
    pub target: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    pub dry_run: bool,
    pub success: bool,
    pub message: String,
    pub executed_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferStats {
    pub log_entries: usize,
    pub metric_entries: usize,
    pub capacity: usize,
    pub retention_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_timestamp: Option<String>,
    pub expired_evictions: u64,
    pub rejected_records: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_incident_list() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/incidents")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{
                    "id": "6f2f0b1e-0000-0000-0000-000000000001",
                    "title": "Elevated error rate in checkout",
                    "description": "40 of 100 requests failed",
                    "category": "error_rate",
                    "severity": "high",
                    "status": "open",
                    "service": "checkout",
                    "created_at": "2024-05-01T12:00:00Z",
                    "updated_at": "2024-05-01T12:05:00Z",
                    "root_cause": {"state": "pending"},
                    "detection_count": 3
                }]"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let incidents: Vec<Incident> = client.get("/v1/incidents").await.unwrap();

        mock.assert_async().await;
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].service, "checkout");
        assert_eq!(incidents[0].detection_count, 3);
        assert!(matches!(incidents[0].root_cause, RootCauseState::Pending));
    }

    #[tokio::test]
    async fn test_root_cause_report_parses() {
        let mut server = mockito::Server::new_async().await;
        let id = "6f2f0b1e-0000-0000-0000-000000000002";
        let mock = server
            .mock("GET", format!("/v1/incidents/{}", id).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{
                    "id": "{}",
                    "title": "Memory exhaustion in worker",
                    "description": "memory above threshold",
                    "category": "resource_exhaustion",
                    "severity": "critical",
                    "status": "investigating",
                    "service": "worker",
                    "created_at": "2024-05-01T12:00:00Z",
                    "updated_at": "2024-05-01T12:10:00Z",
                    "root_cause": {{
                        "state": "available",
                        "report": {{
                            "summary": "Leak in cache layer",
                            "probable_cause": "unbounded session cache",
                            "recommended_actions": ["flush_cache"],
                            "confidence": 0.7
                        }}
                    }},
                    "detection_count": 5
                }}"#,
                id
            ))
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let incident: Incident = client.get(&format!("/v1/incidents/{}", id)).await.unwrap();

        mock.assert_async().await;
        match &incident.root_cause {
            RootCauseState::Available { report } => {
                assert_eq!(report.probable_cause, "unbounded session cache");
                assert_eq!(report.recommended_actions, vec!["flush_cache"]);
            }
            other => panic!("unexpected root cause state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_api_error_includes_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/incidents/bogus")
            .with_status(404)
            .with_body(r#"{"error":"incident not found: bogus"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let result: Result<Incident> = client.get("/v1/incidents/bogus").await;

        mock.assert_async().await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("404"), "error should carry status: {}", err);
        assert!(err.contains("incident not found"), "error should carry body: {}", err);
    }

    #[tokio::test]
    async fn test_put_dry_run_flag() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/v1/autoheal/dry-run")
            .match_body(mockito::Matcher::Json(serde_json::json!({"dry_run": false})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"dry_run": false}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let state: DryRunState = client
            .put("/v1/autoheal/dry-run", &DryRunState { dry_run: false })
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(!state.dry_run);
    }

    #[tokio::test]
    async fn test_invalid_base_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
