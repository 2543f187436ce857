//! Spend Monitor - daily cloud billing anomaly check
//!
//! Runs once per invocation (typically from a scheduler): compares
//! yesterday's spend per project and SKU with the preceding days and
//! alerts on Slack and email when a limit is exceeded.

use anyhow::{Context, Result};
use chrono::Utc;
use monitor_lib::{job, warehouse::BigQuerySource};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let monitor = config::MonitorConfig::load()?
        .validate()
        .context("invalid configuration")?;

    let source = BigQuerySource::new(monitor.bigquery.clone())?;
    let dispatcher = monitor.dispatcher()?;

    info!(
        event = "monitor_configured",
        version = MONITOR_VERSION,
        table = %monitor.bigquery.table,
        billing_project = %monitor.bigquery.billing_project,
        channels = ?dispatcher.channel_names(),
        "Spend monitor configured"
    );

    // Query, detection and delivery failures are reported by the run itself
    job::run(&source, &dispatcher, &monitor.settings, Utc::now().date_naive()).await;

    Ok(())
}
