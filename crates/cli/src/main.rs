//! Incident Sentinel CLI
//!
//! A command-line tool for inspecting incidents, driving the incident
//! lifecycle, and triggering remediations on a sentinel daemon.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{heal, incidents, status};

/// Incident Sentinel CLI
#[derive(Parser)]
#[command(name = "sentinelctl")]
#[command(author, version, about = "CLI for Incident Sentinel", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via SENTINEL_API_URL env var)
    #[arg(long, env = "SENTINEL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and manage incidents
    #[command(subcommand)]
    Incidents(IncidentCommands),

    /// Trigger remediations and manage the dry-run flag
    #[command(subcommand)]
    Heal(HealCommands),

    /// Show the remediation audit trail
    Audit {
        /// Maximum number of records to show
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Show daemon health and buffer occupancy
    Status,
}

#[derive(Subcommand)]
pub enum IncidentCommands {
    /// List incidents
    List {
        /// Filter by status (open, acknowledged, investigating, resolved, closed)
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of incidents to show
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Show full detail for one incident
    Show {
        /// Incident ID
        id: String,
    },

    /// Show the condensed summary for one incident
    Summary {
        /// Incident ID
        id: String,
    },

    /// Acknowledge an open incident
    Ack {
        /// Incident ID
        id: String,

        /// Operator taking ownership
        #[arg(long)]
        assignee: Option<String>,
    },

    /// Resolve an incident
    Resolve {
        /// Incident ID
        id: String,

        /// Resolution note
        #[arg(long)]
        note: Option<String>,
    },

    /// Close an incident
    Close {
        /// Incident ID
        id: String,

        /// Closing note
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum HealCommands {
    /// Execute a remediation action against a target
    Execute {
        /// Action name (e.g. restart_service, scale_replicas, flush_cache)
        action: String,

        /// Target service or resource
        target: String,

        /// Action parameter as key=value (repeatable)
        #[arg(long = "param", short)]
        params: Vec<String>,

        /// Incident to attribute this remediation to
        #[arg(long)]
        incident: Option<String>,

        /// Force simulation for this call
        #[arg(long, conflicts_with = "live")]
        dry_run: bool,

        /// Force real execution for this call
        #[arg(long, conflicts_with = "dry_run")]
        live: bool,
    },

    /// Show or change the global dry-run flag
    DryRun {
        /// New state (on or off); shows the current state when omitted
        state: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Incidents(incident_cmd) => match incident_cmd {
            IncidentCommands::List { status, limit } => {
                incidents::list_incidents(&client, status, limit, cli.format).await?;
            }
            IncidentCommands::Show { id } => {
                incidents::show_incident(&client, &id, cli.format).await?;
            }
            IncidentCommands::Summary { id } => {
                incidents::show_summary(&client, &id, cli.format).await?;
            }
            IncidentCommands::Ack { id, assignee } => {
                incidents::acknowledge_incident(&client, &id, assignee, cli.format).await?;
            }
            IncidentCommands::Resolve { id, note } => {
                incidents::resolve_incident(&client, &id, note, cli.format).await?;
            }
            IncidentCommands::Close { id, note } => {
                incidents::close_incident(&client, &id, note, cli.format).await?;
            }
        },
        Commands::Heal(heal_cmd) => match heal_cmd {
            HealCommands::Execute {
                action,
                target,
                params,
                incident,
                dry_run,
                live,
            } => {
                let dry_run_override = if dry_run {
                    Some(true)
                } else if live {
                    Some(false)
                } else {
                    None
                };
                heal::execute_action(
                    &client,
                    &action,
                    &target,
                    &params,
                    incident,
                    dry_run_override,
                    cli.format,
                )
                .await?;
            }
            HealCommands::DryRun { state } => {
                let state = match state.as_deref() {
                    Some("on") | Some("true") => Some(true),
                    Some("off") | Some("false") => Some(false),
                    Some(other) => anyhow::bail!("invalid state '{}', expected on or off", other),
                    None => None,
                };
                heal::dry_run(&client, state, cli.format).await?;
            }
        },
        Commands::Audit { limit } => {
            heal::list_audit(&client, limit, cli.format).await?;
        }
        Commands::Status => {
            status::show_status(&client, cli.format).await?;
        }
    }

    Ok(())
}
