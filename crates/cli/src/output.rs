//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
#[allow(dead_code)]
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
#[allow(dead_code)]
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Truncate a UUID for table display
pub fn truncate_id(id: &str) -> String {
    if id.len() > 8 {
        format!("{}...", &id[..8])
    } else {
        id.to_string()
    }
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    // Try to parse and format nicely, otherwise return as-is
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M").to_string()
    } else {
        ts.to_string()
    }
}

/// Format a duration in minutes as human-readable string
pub fn format_duration(minutes: f64) -> String {
    if minutes >= 1440.0 {
        format!("{:.1}d", minutes / 1440.0)
    } else if minutes >= 60.0 {
        format!("{:.1}h", minutes / 60.0)
    } else {
        format!("{:.0}m", minutes)
    }
}

/// Color incident status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "open" => status.red().to_string(),
        "acknowledged" => status.yellow().to_string(),
        "investigating" => status.blue().to_string(),
        "resolved" => status.green().to_string(),
        "closed" => status.dimmed().to_string(),
        "healthy" | "ready" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color severity based on value
pub fn color_severity(severity: &str) -> String {
    match severity.to_lowercase().as_str() {
        "critical" => severity.red().bold().to_string(),
        "high" => severity.red().to_string(),
        "medium" => severity.yellow().to_string(),
        "low" => severity.blue().to_string(),
        _ => severity.to_string(),
    }
}

/// Format confidence as percentage
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.0}%", confidence * 100.0)
}

/// Render a dry-run or live outcome marker
pub fn outcome_marker(success: bool, dry_run: bool) -> String {
    if dry_run {
        "~".yellow().to_string()
    } else if success {
        "✓".green().to_string()
    } else {
        "✗".red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_id() {
        assert_eq!(truncate_id("6f2f0b1e-0000"), "6f2f0b1e...");
        assert_eq!(truncate_id("short"), "short");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45.0), "45m");
        assert_eq!(format_duration(90.0), "1.5h");
        assert_eq!(format_duration(2880.0), "2.0d");
    }

    #[test]
    fn test_format_timestamp_passthrough() {
        assert_eq!(format_timestamp("garbage"), "garbage");
        assert_eq!(
            format_timestamp("2024-05-01T12:00:00Z"),
            "2024-05-01 12:00"
        );
    }

    #[test]
    fn test_format_confidence() {
        assert_eq!(format_confidence(0.7), "70%");
    }
}
