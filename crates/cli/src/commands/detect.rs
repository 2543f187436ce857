//! Detection and alert preview commands

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use monitor_lib::{
    alert::{render_html, render_markdown, AlertMessage},
    job::{analyze, Analysis},
    Anomaly,
};
use serde_json::json;
use tabled::{settings::Style, Table, Tabled};

use super::{DetectArgs, SourceArgs};
use crate::output::{color_percent, format_currency, print_info, print_success, print_warning, OutputFormat};

/// Channel rendering used by `preview`
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PreviewChannel {
    /// Slack mrkdwn
    Slack,
    /// HTML email
    Email,
}

/// Row for anomalies table
#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "SKU")]
    sku: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Spend")]
    spend: String,
    #[tabled(rename = "Baseline")]
    baseline: String,
    #[tabled(rename = "Exceeded by")]
    change: String,
    #[tabled(rename = "Exceeded by (%)")]
    percent: String,
}

impl AnomalyRow {
    fn new(anomaly: &Anomaly, currency: &str, days_to_average: u32) -> Self {
        Self {
            project: anomaly.project_id.clone(),
            sku: anomaly.sku_id.clone(),
            description: anomaly.sku_description.clone(),
            metric: format!("{}-day {}", days_to_average, anomaly.change_type),
            spend: format_currency(anomaly.spend, currency),
            baseline: format_currency(anomaly.baseline, currency),
            change: format_currency(anomaly.absolute_change, currency),
            percent: color_percent(&anomaly.percent_change),
        }
    }
}

/// Run detection and list anomalies
pub async fn run_detect(source: &SourceArgs, args: &DetectArgs, format: OutputFormat) -> Result<()> {
    let settings = args.settings()?;
    let usage = source.usage_source()?;
    let analysis = analyze(usage.as_ref(), &settings, args.evaluation_day()).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        OutputFormat::Table => print_analysis(&analysis, settings.days_to_average),
    }

    Ok(())
}

fn print_analysis(analysis: &Analysis, days_to_average: u32) {
    let report = &analysis.report;

    println!(
        "{} {}",
        "Spend check for".bold(),
        report.evaluation_day.to_string().cyan()
    );
    println!("{}", "=".repeat(50));
    println!(
        "Window:        {} to {}",
        analysis.window.start, analysis.window.end
    );
    println!("Rows:          {}", analysis.row_count);
    println!("Series:        {}", report.series_evaluated);
    println!("History days:  {}/{}", report.history_days, days_to_average);
    println!();

    if let Some(pretext) = &report.pretext {
        print_warning(pretext);
    }

    let Some(currency) = analysis.currency.as_deref() else {
        print_warning("No usage rows in the lookback window");
        return;
    };

    if !report.is_conclusive() {
        print_warning("Not enough data to compare spend");
        return;
    }

    if !report.has_anomalies() {
        print_success("No limits exceeded");
        return;
    }

    let rows: Vec<AnomalyRow> = report
        .anomalies
        .iter()
        .map(|a| AnomalyRow::new(a, currency, days_to_average))
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    println!();
    print_warning(&format!("{} limit(s) exceeded", report.anomalies.len()));
}

/// Render the alert without sending it
pub async fn run_preview(
    source: &SourceArgs,
    args: &DetectArgs,
    channel: PreviewChannel,
    format: OutputFormat,
) -> Result<()> {
    let settings = args.settings()?;
    let usage = source.usage_source()?;
    let analysis = analyze(usage.as_ref(), &settings, args.evaluation_day()).await?;

    let currency = match analysis.currency.as_deref() {
        Some(currency) if analysis.report.has_anomalies() => currency,
        _ => {
            print_info("No limits exceeded, nothing would be sent");
            return Ok(());
        }
    };

    let message = AlertMessage::build(&analysis.report, currency, settings.days_to_average);
    let body = match channel {
        PreviewChannel::Slack => render_markdown(&message),
        PreviewChannel::Email => render_html(&message),
    };

    match format {
        OutputFormat::Json => {
            let preview = json!({
                "title": message.title,
                "pretext": message.pretext,
                "body_title": message.body_title,
                "body": body,
            });
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        OutputFormat::Table => {
            println!("{}", message.title.bold());
            if let Some(pretext) = &message.pretext {
                println!("{}", pretext.italic());
            }
            println!("{}", message.body_title.bold());
            println!("{}", "-".repeat(50));
            println!("{}", body);
        }
    }

    Ok(())
}
