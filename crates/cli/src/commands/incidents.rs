//! Incident lifecycle CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{AcknowledgeRequest, ApiClient, Incident, IncidentSummary, NoteRequest, RootCauseState};
use crate::output::{
    color_severity, color_status, format_confidence, format_duration, format_timestamp,
    print_success, print_warning, truncate_id, OutputFormat,
};

/// Row for the incidents table
#[derive(Tabled)]
struct IncidentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detections")]
    detections: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Title")]
    title: String,
}

/// List incidents with optional status filter
pub async fn list_incidents(
    client: &ApiClient,
    status: Option<String>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let path = match &status {
        Some(s) => format!("/v1/incidents?status={}&limit={}", s, limit),
        None => format!("/v1/incidents?limit={}", limit),
    };

    let incidents: Vec<Incident> = client.get(&path).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&incidents)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if incidents.is_empty() {
                print_warning("No incidents found");
                return Ok(());
            }

            let rows: Vec<IncidentRow> = incidents
                .iter()
                .map(|i| IncidentRow {
                    id: truncate_id(&i.id),
                    service: i.service.clone(),
                    category: i.category.clone(),
                    severity: color_severity(&i.severity),
                    status: color_status(&i.status),
                    detections: i.detection_count.to_string(),
                    created: format_timestamp(&i.created_at),
                    title: i.title.clone(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} incidents", incidents.len());
        }
    }

    Ok(())
}

/// Show full detail for one incident
pub async fn show_incident(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let incident: Incident = client.get(&format!("/v1/incidents/{}", id)).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&incident)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", incident.title.bold());
            println!("{}", "=".repeat(60));
            println!("ID:          {}", incident.id);
            println!("Service:     {}", incident.service.cyan());
            println!("Category:    {}", incident.category);
            println!("Severity:    {}", color_severity(&incident.severity));
            println!("Status:      {}", color_status(&incident.status));
            println!("Detections:  {}", incident.detection_count);
            println!("Created:     {}", format_timestamp(&incident.created_at));
            println!("Updated:     {}", format_timestamp(&incident.updated_at));
            if let Some(assignee) = &incident.assignee {
                println!("Assignee:    {}", assignee);
            }
            if let Some(resolved_at) = &incident.resolved_at {
                println!("Resolved:    {}", format_timestamp(resolved_at));
            }
            if let Some(note) = &incident.resolution_note {
                println!("Resolution:  {}", note);
            }
            println!("\n{}", incident.description);

            print_root_cause(&incident.root_cause);
        }
    }

    Ok(())
}

fn print_root_cause(state: &RootCauseState) {
    match state {
        RootCauseState::Pending => {
            println!("\nRoot cause: {}", "analysis pending".yellow());
        }
        RootCauseState::Available { report } => {
            println!("\n{}", "Root Cause Analysis".bold());
            println!("{}", "-".repeat(60));
            println!("Summary:        {}", report.summary);
            println!("Probable cause: {}", report.probable_cause);
            println!("Confidence:     {}", format_confidence(report.confidence));
            if !report.recommended_actions.is_empty() {
                println!("Recommended actions:");
                for action in &report.recommended_actions {
                    println!("  - {}", action);
                }
            }
        }
        RootCauseState::Unavailable { attempts, last_error } => {
            println!(
                "\nRoot cause: {} after {} attempts ({})",
                "unavailable".red(),
                attempts,
                last_error
            );
        }
    }
}

/// Show the condensed summary for one incident
pub async fn show_summary(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let summary: IncidentSummary = client
        .get(&format!("/v1/incidents/{}/summary", id))
        .await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&summary)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", summary.title.bold());
            println!("{}", "=".repeat(60));
            println!("Service:     {}", summary.service.cyan());
            println!("Severity:    {}", color_severity(&summary.severity));
            println!("Status:      {}", color_status(&summary.status));
            println!("Duration:    {}", format_duration(summary.duration_minutes));
            println!("Detections:  {}", summary.detection_count);
            if let Some(cause) = &summary.probable_cause {
                println!("Cause:       {}", cause);
            }
            if let Some(note) = &summary.resolution_note {
                println!("Resolution:  {}", note);
            }
        }
    }

    Ok(())
}

/// Acknowledge an open incident
pub async fn acknowledge_incident(
    client: &ApiClient,
    id: &str,
    assignee: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = AcknowledgeRequest { assignee: assignee.clone() };
    let incident: Incident = client
        .post(&format!("/v1/incidents/{}/acknowledge", id), &request)
        .await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&incident)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            print_success(&format!("Incident {} acknowledged", truncate_id(id)));
            if let Some(assignee) = assignee {
                println!("Assignee: {}", assignee);
            }
            println!("Status: {}", color_status(&incident.status));
        }
    }

    Ok(())
}

/// Resolve an incident
pub async fn resolve_incident(
    client: &ApiClient,
    id: &str,
    note: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = NoteRequest { note };
    let incident: Incident = client
        .post(&format!("/v1/incidents/{}/resolve", id), &request)
        .await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&incident)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            print_success(&format!("Incident {} resolved", truncate_id(id)));
            println!("Status: {}", color_status(&incident.status));
            if let Some(note) = &incident.resolution_note {
                println!("Note: {}", note);
            }
        }
    }

    Ok(())
}

/// Close an incident
pub async fn close_incident(
    client: &ApiClient,
    id: &str,
    note: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = NoteRequest { note };
    let incident: Incident = client
        .post(&format!("/v1/incidents/{}/close", id), &request)
        .await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&incident)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            print_success(&format!("Incident {} closed", truncate_id(id)));
            println!("Status: {}", color_status(&incident.status));
        }
    }

    Ok(())
}
