//! Daemon status CLI commands

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use crate::client::{ApiClient, BufferStats, HealthResponse, ReadinessResponse};
use crate::output::{color_status, format_timestamp, print_warning, OutputFormat};

/// Show daemon health, readiness, and buffer occupancy
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get("/healthz").await?;
    let readiness: ReadinessResponse = client.get("/readyz").await?;
    let buffer: BufferStats = client.get("/v1/buffer/stats").await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&json!({
                "health": health,
                "readiness": readiness,
                "buffer": buffer,
            }))?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", "Sentinel Status".bold());
            println!("{}", "=".repeat(60));
            println!("Overall: {}", color_status(&health.status));
            println!(
                "Ready:   {}",
                if readiness.ready {
                    "yes".green().to_string()
                } else {
                    "no".red().to_string()
                }
            );
            if let Some(reason) = &readiness.reason {
                print_warning(reason);
            }

            println!("\n{}", "Components".bold());
            let mut names: Vec<_> = health.components.keys().collect();
            names.sort();
            for name in names {
                let component = &health.components[name];
                print!("  {:<14} {}", name, color_status(&component.status));
                if let Some(message) = &component.message {
                    print!("  ({})", message);
                }
                println!();
            }

            println!("\n{}", "Ingestion Buffer".bold());
            println!(
                "  Logs: {}  Metrics: {}  Capacity: {}",
                buffer.log_entries, buffer.metric_entries, buffer.capacity
            );
            println!(
                "  Evicted: {}  Rejected: {}",
                buffer.expired_evictions, buffer.rejected_records
            );
            if let (Some(oldest), Some(newest)) =
                (&buffer.oldest_timestamp, &buffer.newest_timestamp)
            {
                println!(
                    "  Span: {} .. {}",
                    format_timestamp(oldest),
                    format_timestamp(newest)
                );
            }
        }
    }

    Ok(())
}
