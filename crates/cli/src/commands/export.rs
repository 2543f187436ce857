//! Usage export command

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use colored::Colorize;
use monitor_lib::{
    models::{LookbackWindow, MAX_DAYS_TO_AVERAGE},
    warehouse::UsageSource,
};

use super::{resolve_evaluation_day, SourceArgs};
use crate::output::{print_info, print_success, OutputFormat};

/// Fetch the lookback window from BigQuery and write it as JSON rows
pub async fn export_usage(
    source: &SourceArgs,
    evaluation_day: Option<NaiveDate>,
    days_to_average: u32,
    output: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    if !(1..=MAX_DAYS_TO_AVERAGE).contains(&days_to_average) {
        bail!("--days-to-average must be between 1 and {}", MAX_DAYS_TO_AVERAGE);
    }

    let bigquery = source.bigquery()?;
    let window = LookbackWindow::ending(resolve_evaluation_day(evaluation_day), days_to_average)?;

    let rows = bigquery
        .fetch(window)
        .await
        .with_context(|| format!("failed to fetch usage from {}", bigquery.name()))?;
    let json = serde_json::to_string_pretty(&rows)?;

    if let Some(output_path) = output {
        std::fs::write(&output_path, &json)
            .with_context(|| format!("failed to write {}", output_path))?;
        print_success(&format!("Usage exported to {}", output_path));
        println!("Exported {} rows", rows.len());
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", "Usage Export".bold());
            println!("{}", "=".repeat(50));
            println!("Window:  {} to {}", window.start, window.end);
            println!("Rows:    {}", rows.len());
            println!();
            print_info("Use --output <file> to save to a file");
            print_info("Use --format json to see full data");
        }
    }

    Ok(())
}
