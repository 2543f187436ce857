//! JSON file usage source

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::{UsageSource, WarehouseError};
use crate::models::{LookbackWindow, UsageRow};

/// Reads a JSON array of usage rows from disk
///
/// Rows outside the requested window are dropped.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UsageSource for JsonFileSource {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn fetch(&self, window: LookbackWindow) -> Result<Vec<UsageRow>, WarehouseError> {
        let content =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| WarehouseError::Io {
                    path: self.path.clone(),
                    source,
                })?;

        let rows: Vec<UsageRow> =
            serde_json::from_str(&content).map_err(|source| WarehouseError::Json {
                path: self.path.clone(),
                source,
            })?;

        let total = rows.len();
        let rows: Vec<UsageRow> = rows
            .into_iter()
            .filter(|row| window.contains(row.day))
            .collect();

        debug!(
            path = %self.path.display(),
            total,
            in_window = rows.len(),
            "Loaded usage rows from file"
        );

        Ok(rows)
    }
}
