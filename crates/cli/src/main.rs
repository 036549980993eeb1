//! Fleet Advisor CLI
//!
//! Evaluates a snapshot of compute clusters against runtime lifecycle,
//! hardware generation and driver sizing best practices, and publishes
//! cost-attributed findings.

mod commands;
mod config;
mod output;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use commands::{reference, run};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fleet Advisor CLI
#[derive(Parser)]
#[command(name = "fleet-advisor")]
#[command(author, version, about = "Compute fleet best-practice advisor", long_about = None)]
pub struct Cli {
    /// Configuration file (can also be set via FLEET_ADVISOR_CONFIG env var)
    #[arg(long, global = true, env = "FLEET_ADVISOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a fleet snapshot and publish the result tables
    Run(run::RunArgs),

    /// Show the runtime lifecycle table
    Lifecycle {
        /// Evaluation date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Days before end-of-support at which LTS releases turn to warning
        #[arg(long, allow_negative_numbers = true)]
        warning_window_days: Option<i64>,
    },

    /// Classify a single runtime or node type
    #[command(subcommand)]
    Classify(ClassifyCommands),
}

#[derive(Subcommand)]
pub enum ClassifyCommands {
    /// Classify a runtime version string (e.g. 15.4.x-scala2.12)
    Runtime {
        version: String,

        /// Evaluation date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Classify a node type id (e.g. Standard_D4ds_v5)
    NodeType { node_type: String },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run(args) => {
            run::execute(args, config_path, cli.format).await?;
        }
        Commands::Lifecycle {
            as_of,
            warning_window_days,
        } => {
            reference::show_lifecycle(config_path, as_of, warning_window_days, cli.format)?;
        }
        Commands::Classify(classify_cmd) => match classify_cmd {
            ClassifyCommands::Runtime { version, as_of } => {
                reference::classify_runtime(config_path, &version, as_of, cli.format)?;
            }
            ClassifyCommands::NodeType { node_type } => {
                reference::classify_node_type(config_path, &node_type, cli.format)?;
            }
        },
    }

    Ok(())
}
