//! Usage data sources
//!
//! This module provides:
//! - The [`UsageSource`] trait the job fetches usage rows through
//! - A BigQuery billing-export source using the REST API
//! - A JSON file source for local runs

mod bigquery;
mod file;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{LookbackWindow, UsageRow};

pub use bigquery::{
    BigQueryConfig, BigQuerySource, Credentials, TableRef, DEFAULT_BIGQUERY_ENDPOINT,
    METADATA_TOKEN_URL,
};
pub use file::JsonFileSource;

/// Errors raised while fetching usage data
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("invalid table id '{0}', expected project.dataset.table")]
    InvalidTableId(String),

    #[error("failed to obtain access token: {0}")]
    Auth(String),

    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("row {index}: {reason}")]
    MalformedRow { index: usize, reason: String },

    #[error("query job did not complete after {0} polls")]
    Incomplete(u32),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Supplies usage rows for a lookback window
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Source name for logs
    fn name(&self) -> &str;

    /// Fetch all usage rows dated within `window`
    async fn fetch(&self, window: LookbackWindow) -> Result<Vec<UsageRow>, WarehouseError>;
}
