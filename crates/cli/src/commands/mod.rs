//! CLI commands and their shared arguments

pub mod detect;
pub mod export;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Args;
use monitor_lib::{
    job::JobSettings,
    models::{evaluation_day_for, MAX_DAYS_TO_AVERAGE},
    warehouse::{BigQueryConfig, BigQuerySource, Credentials, JsonFileSource, TableRef, UsageSource},
    AlertMetric,
};
use rust_decimal::Decimal;

/// Where usage rows come from
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// JSON file of usage rows (as written by `export`)
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// BigQuery billing export table (project.dataset.table)
    #[arg(long, env = "SOURCE_TABLE_ID")]
    pub table: Option<String>,

    /// Project billed for the query job
    #[arg(long, env = "GCP_PROJECT_ID")]
    pub project: Option<String>,

    /// OAuth access token (uses the metadata server if not specified)
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// BigQuery API endpoint
    #[arg(long, env = "BIGQUERY_ENDPOINT")]
    pub bigquery_endpoint: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl SourceArgs {
    /// A file source when `--input` is given, BigQuery otherwise
    pub fn usage_source(&self) -> Result<Box<dyn UsageSource>> {
        match &self.input {
            Some(path) => Ok(Box::new(JsonFileSource::new(path.clone()))),
            None => Ok(Box::new(self.bigquery()?)),
        }
    }

    pub fn bigquery(&self) -> Result<BigQuerySource> {
        let table_id = self
            .table
            .as_deref()
            .ok_or_else(|| anyhow!("either --input or --table (SOURCE_TABLE_ID) is required"))?;

        if self.timeout_secs == 0 {
            return Err(anyhow!("--timeout-secs must be at least 1"));
        }

        let mut config = BigQueryConfig::for_table(TableRef::parse(table_id)?)?;
        config.timeout = Duration::from_secs(self.timeout_secs);
        if let Some(project) = &self.project {
            config.billing_project = project.clone();
        }
        if let Some(endpoint) = &self.bigquery_endpoint {
            config.endpoint = endpoint
                .parse()
                .with_context(|| format!("invalid BigQuery endpoint: {}", endpoint))?;
        }
        if let Some(token) = &self.access_token {
            config.credentials = Credentials::AccessToken(token.clone());
        }

        Ok(BigQuerySource::new(config)?)
    }
}

/// Detection parameters
#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
    /// Day to evaluate (YYYY-MM-DD, defaults to yesterday UTC)
    #[arg(long)]
    pub evaluation_day: Option<NaiveDate>,

    /// Days of history the baselines are meant to cover
    #[arg(long, env = "DAYS_TO_AVERAGE", default_value_t = 30)]
    pub days_to_average: u32,

    /// Minimum absolute excess over a baseline
    #[arg(long, env = "CHANGE_THRESHOLD", default_value = "0")]
    pub change_threshold: Decimal,

    /// Baselines to compare against (average, max, all)
    #[arg(long, env = "ALERT_METRIC", default_value = "all")]
    pub metric: AlertMetric,

    /// Minimum percent excess over a baseline
    #[arg(long, env = "MIN_PERCENT_CHANGE")]
    pub min_percent_change: Option<Decimal>,
}

impl DetectArgs {
    pub fn settings(&self) -> Result<JobSettings> {
        if !(1..=MAX_DAYS_TO_AVERAGE).contains(&self.days_to_average) {
            return Err(anyhow!(
                "--days-to-average must be between 1 and {}",
                MAX_DAYS_TO_AVERAGE
            ));
        }
        if self.change_threshold.is_sign_negative() {
            return Err(anyhow!("--change-threshold must not be negative"));
        }

        Ok(JobSettings {
            days_to_average: self.days_to_average,
            change_threshold: self.change_threshold,
            alert_metric: self.metric,
            min_percent_change: self.min_percent_change,
            dry_run: true,
        })
    }

    pub fn evaluation_day(&self) -> NaiveDate {
        resolve_evaluation_day(self.evaluation_day)
    }
}

pub fn resolve_evaluation_day(day: Option<NaiveDate>) -> NaiveDate {
    day.unwrap_or_else(|| evaluation_day_for(Utc::now().date_naive()))
}
