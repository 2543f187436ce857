//! Cloud Spend Monitor CLI
//!
//! A command-line tool for running the spend anomaly check by hand,
//! previewing alerts without sending them, and exporting usage rows.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{detect, export, DetectArgs, SourceArgs};
use tracing_subscriber::EnvFilter;

/// Cloud Spend Monitor CLI
#[derive(Parser)]
#[command(name = "spendctl")]
#[command(author, version, about = "CLI for Cloud Spend Monitor", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compare a day's spend against its baselines and list anomalies
    Detect {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        options: DetectArgs,
    },

    /// Render the alert a run would send, without sending it
    Preview {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        options: DetectArgs,

        /// Channel to render for
        #[arg(long, value_enum, default_value = "slack")]
        channel: detect::PreviewChannel,
    },

    /// Export the lookback window from BigQuery as JSON usage rows
    Export {
        #[command(flatten)]
        source: SourceArgs,

        /// Last day of the window (YYYY-MM-DD, defaults to yesterday UTC)
        #[arg(long)]
        evaluation_day: Option<chrono::NaiveDate>,

        /// Days of history before the evaluation day
        #[arg(long, env = "DAYS_TO_AVERAGE", default_value_t = 30)]
        days_to_average: u32,

        /// Output file path
        #[arg(long, short)]
        output: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match cli.command {
        Commands::Detect { source, options } => {
            detect::run_detect(&source, &options, cli.format).await?;
        }
        Commands::Preview {
            source,
            options,
            channel,
        } => {
            detect::run_preview(&source, &options, channel, cli.format).await?;
        }
        Commands::Export {
            source,
            evaluation_day,
            days_to_average,
            output,
        } => {
            export::export_usage(&source, evaluation_day, days_to_average, output, cli.format)
                .await?;
        }
    }

    Ok(())
}
