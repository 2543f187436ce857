//! Monitor configuration

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use monitor_lib::{
    job::JobSettings,
    models::MAX_DAYS_TO_AVERAGE,
    notify::{parse_recipients, Dispatcher, SendGridEmail, SlackWebhook},
    warehouse::{BigQueryConfig, Credentials, TableRef},
    AlertMetric,
};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Names an optional config file layered under the environment
pub const CONFIG_FILE_VAR: &str = "SPEND_MONITOR_CONFIG";

/// Raw monitor configuration, one field per environment variable
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Billing export table, `project.dataset.table`
    pub source_table_id: Option<String>,

    #[serde(default = "default_days_to_average")]
    pub days_to_average: u32,

    #[serde(default = "default_change_threshold")]
    pub change_threshold: String,

    #[serde(default = "default_alert_metric")]
    pub alert_metric: String,

    pub min_percent_change: Option<String>,

    /// Project billed for the query job
    pub gcp_project_id: Option<String>,
    pub google_access_token: Option<String>,
    pub bigquery_endpoint: Option<String>,

    pub slack_webhook_url: Option<String>,
    pub sendgrid_api_key: Option<String>,
    pub email_source: Option<String>,
    /// Comma-separated
    pub email_recipients: Option<String>,
    pub sendgrid_endpoint: Option<String>,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub dry_run: bool,
}

fn default_days_to_average() -> u32 {
    30
}

fn default_change_threshold() -> String {
    "0".to_string()
}

fn default_alert_metric() -> String {
    "all".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

/// Validated configuration ready to build a run from
#[derive(Debug, Clone)]
pub struct Monitor {
    pub settings: JobSettings,
    pub bigquery: BigQueryConfig,
    slack_webhook_url: Option<String>,
    sendgrid_api_key: Option<String>,
    email_source: Option<String>,
    email_recipients: Vec<String>,
    sendgrid_endpoint: Option<url::Url>,
    timeout: Duration,
}

impl MonitorConfig {
    /// Load configuration from the process environment and the optional
    /// file named by `SPEND_MONITOR_CONFIG`
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_VAR).ok();
        Self::load_from(file.as_deref().map(Path::new), None)
    }

    /// Load from an explicit file and environment map. `env: None` reads
    /// the process environment.
    pub fn load_from(file: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(config::Environment::default().source(env))
            .build()
            .context("failed to read configuration")?;

        config
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    /// Check every value and resolve defaults
    pub fn validate(&self) -> Result<Monitor> {
        let table_id = non_blank(&self.source_table_id)
            .ok_or_else(|| anyhow!("SOURCE_TABLE_ID must be set"))?;
        let table = TableRef::parse(table_id)?;

        if !(1..=MAX_DAYS_TO_AVERAGE).contains(&self.days_to_average) {
            bail!("DAYS_TO_AVERAGE must be between 1 and {}", MAX_DAYS_TO_AVERAGE);
        }

        let change_threshold = Decimal::from_str(self.change_threshold.trim())
            .with_context(|| format!("invalid CHANGE_THRESHOLD: {}", self.change_threshold))?;
        if change_threshold.is_sign_negative() {
            bail!("CHANGE_THRESHOLD must not be negative");
        }

        let alert_metric = AlertMetric::from_str(self.alert_metric.trim())?;

        let min_percent_change = non_blank(&self.min_percent_change)
            .map(|raw| {
                Decimal::from_str(raw).with_context(|| format!("invalid MIN_PERCENT_CHANGE: {raw}"))
            })
            .transpose()?;

        if self.http_timeout_secs == 0 {
            bail!("HTTP_TIMEOUT_SECS must be at least 1");
        }
        let timeout = Duration::from_secs(self.http_timeout_secs);

        let mut bigquery = BigQueryConfig::for_table(table)?;
        bigquery.timeout = timeout;
        if let Some(project) = non_blank(&self.gcp_project_id) {
            bigquery.billing_project = project.to_string();
        }
        if let Some(endpoint) = non_blank(&self.bigquery_endpoint) {
            bigquery.endpoint = parse_url("BIGQUERY_ENDPOINT", endpoint)?;
        }
        if let Some(token) = non_blank(&self.google_access_token) {
            bigquery.credentials = Credentials::AccessToken(token.to_string());
        }

        let sendgrid_endpoint = non_blank(&self.sendgrid_endpoint)
            .map(|raw| parse_url("SENDGRID_ENDPOINT", raw))
            .transpose()?;

        Ok(Monitor {
            settings: JobSettings {
                days_to_average: self.days_to_average,
                change_threshold,
                alert_metric,
                min_percent_change,
                dry_run: self.dry_run,
            },
            bigquery,
            slack_webhook_url: non_blank(&self.slack_webhook_url).map(str::to_string),
            sendgrid_api_key: non_blank(&self.sendgrid_api_key).map(str::to_string),
            email_source: non_blank(&self.email_source).map(str::to_string),
            email_recipients: self
                .email_recipients
                .as_deref()
                .map(parse_recipients)
                .unwrap_or_default(),
            sendgrid_endpoint,
            timeout,
        })
    }
}

impl Monitor {
    /// Slack first, then email. Channels with missing credentials are still
    /// registered and report the missing variable when sending.
    pub fn dispatcher(&self) -> Result<Dispatcher> {
        let slack = SlackWebhook::new(self.slack_webhook_url.clone(), self.timeout)?;

        let mut email = SendGridEmail::new(
            self.sendgrid_api_key.clone(),
            self.email_source.clone(),
            self.email_recipients.clone(),
            self.timeout,
        )?;
        if let Some(endpoint) = &self.sendgrid_endpoint {
            email = email.with_endpoint(endpoint.clone());
        }

        Ok(Dispatcher::new()
            .with_channel(Box::new(slack))
            .with_channel(Box::new(email)))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_url(name: &str, raw: &str) -> Result<url::Url> {
    url::Url::parse(raw).with_context(|| format!("invalid {name}: {raw}"))
}
