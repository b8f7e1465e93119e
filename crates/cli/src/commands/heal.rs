//! Remediation and audit CLI commands

use std::collections::HashMap;

use anyhow::{bail, Result};
use tabled::Tabled;

use crate::client::{ApiClient, DryRunState, ExecuteRequest, RemediationRecord};
use crate::output::{
    format_timestamp, outcome_marker, print_info, print_success, print_warning, truncate_id,
    OutputFormat,
};

/// Row for the remediation audit table
#[derive(Tabled)]
struct RemediationRow {
    #[tabled(rename = "Executed")]
    executed: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Incident")]
    incident: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Parse repeated `key=value` arguments into a parameter map
pub fn parse_parameters(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut parameters = HashMap::new();
    for entry in raw {
        match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                parameters.insert(key.to_string(), value.to_string());
            }
            _ => bail!("invalid parameter '{}', expected key=value", entry),
        }
    }
    Ok(parameters)
}

/// Execute a remediation action against a target
#[allow(clippy::too_many_arguments)]
pub async fn execute_action(
    client: &ApiClient,
    action: &str,
    target: &str,
    params: &[String],
    incident_id: Option<String>,
    dry_run: Option<bool>,
    format: OutputFormat,
) -> Result<()> {
    let request = ExecuteRequest {
        action: action.to_string(),
        target: target.to_string(),
        parameters: parse_parameters(params)?,
        incident_id,
        dry_run,
    };

    let record: RemediationRecord = client.post("/v1/autoheal/execute", &request).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&record)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if record.dry_run {
                print_warning("Dry-run mode - no changes applied");
            } else if record.success {
                print_success(&format!("Executed {} on {}", record.action, record.target));
            } else {
                print_warning(&format!("Failed {} on {}", record.action, record.target));
            }
            println!("Message: {}", record.message);
            println!("Record: {}", record.id);
        }
    }

    Ok(())
}

/// Show or change the daemon's global dry-run flag
pub async fn dry_run(client: &ApiClient, state: Option<bool>, format: OutputFormat) -> Result<()> {
    let response: DryRunState = match state {
        Some(dry_run) => {
            client
                .put("/v1/autoheal/dry-run", &DryRunState { dry_run })
                .await?
        }
        None => client.get("/v1/autoheal/dry-run").await?,
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&response)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if response.dry_run {
                print_info("Dry-run is ON - remediations are simulated");
            } else {
                print_warning("Dry-run is OFF - remediations execute for real");
            }
        }
    }

    Ok(())
}

/// List the remediation audit trail, newest first
pub async fn list_audit(client: &ApiClient, limit: usize, format: OutputFormat) -> Result<()> {
    let records: Vec<RemediationRecord> = client
        .get(&format!("/v1/audit/remediations?limit={}", limit))
        .await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&records)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if records.is_empty() {
                print_warning("No remediation records found");
                return Ok(());
            }

            let rows: Vec<RemediationRow> = records
                .iter()
                .map(|r| RemediationRow {
                    executed: format_timestamp(&r.executed_at),
                    action: r.action.clone(),
                    target: r.target.clone(),
                    mode: if r.dry_run { "dry-run" } else { "live" }.to_string(),
                    outcome: outcome_marker(r.success, r.dry_run),
                    incident: r
                        .incident_id
                        .as_deref()
                        .map(truncate_id)
                        .unwrap_or_else(|| "-".to_string()),
                    message: r.message.clone(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} records", records.len());
        }
    }

    Ok(())
}
