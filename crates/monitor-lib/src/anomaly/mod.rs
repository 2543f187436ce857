//! Spend anomaly detection
//!
//! This module provides:
//! - Baselines (rolling average and rolling maximum) per project/SKU series
//! - The detector comparing the evaluation day against those baselines
//! - Anomaly types shared with the alert formatter

mod baseline;
mod detector;

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

pub use baseline::Baseline;
pub use detector::{DetectionReport, SpendAnomalyDetector};

/// Baseline rule that produced an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Average,
    Max,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Average => write!(f, "average"),
            ChangeType::Max => write!(f, "max"),
        }
    }
}

/// Which baseline rules run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMetric {
    Average,
    Max,
    #[default]
    All,
}

impl AlertMetric {
    pub fn includes(&self, change_type: ChangeType) -> bool {
        match self {
            AlertMetric::All => true,
            AlertMetric::Average => change_type == ChangeType::Average,
            AlertMetric::Max => change_type == ChangeType::Max,
        }
    }
}

impl fmt::Display for AlertMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertMetric::Average => write!(f, "average"),
            AlertMetric::Max => write!(f, "max"),
            AlertMetric::All => write!(f, "all"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown alert metric '{0}', expected one of: average, max, all")]
pub struct ParseAlertMetricError(String);

impl FromStr for AlertMetric {
    type Err = ParseAlertMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" => Ok(AlertMetric::Average),
            "max" => Ok(AlertMetric::Max),
            "all" => Ok(AlertMetric::All),
            other => Err(ParseAlertMetricError(other.to_string())),
        }
    }
}

/// Relative change against a baseline, in percent
///
/// `Infinite` is used when the baseline is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercentChange {
    Finite(Decimal),
    Infinite,
}

impl PercentChange {
    /// Percent change of `delta` relative to `baseline`, at full precision
    pub fn of(delta: Decimal, baseline: Decimal) -> Self {
        if baseline.is_zero() {
            return PercentChange::Infinite;
        }
        delta
            .checked_div(baseline)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .map_or(PercentChange::Infinite, PercentChange::Finite)
    }

    /// Value rounded to 2 decimal places for display
    pub fn rounded(&self) -> Self {
        match self {
            PercentChange::Finite(value) => PercentChange::Finite(value.round_dp(2)),
            PercentChange::Infinite => PercentChange::Infinite,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, PercentChange::Infinite)
    }

    /// `true` when this change is at least `minimum` percent
    pub fn reaches(&self, minimum: Decimal) -> bool {
        match self {
            PercentChange::Finite(value) => *value >= minimum,
            PercentChange::Infinite => true,
        }
    }
}

impl fmt::Display for PercentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PercentChange::Finite(value) => write!(f, "{:.2}", value.round_dp(2)),
            PercentChange::Infinite => write!(f, "inf"),
        }
    }
}

impl Serialize for PercentChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PercentChange::Finite(value) => Serialize::serialize(value, serializer),
            PercentChange::Infinite => serializer.serialize_str("inf"),
        }
    }
}

/// Spend on the evaluation day exceeding a baseline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub project_id: String,
    pub sku_id: String,
    pub sku_description: String,
    pub change_type: ChangeType,
    /// Full-precision excess over the baseline
    pub absolute_change: Decimal,
    /// Rounded to 2 decimal places
    pub percent_change: PercentChange,
    /// Evaluation day spend
    pub spend: Decimal,
    /// Baseline value that was exceeded
    pub baseline: Decimal,
}
