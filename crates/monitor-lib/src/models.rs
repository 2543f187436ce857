//! Core data models for the spend monitor

use chrono::{Days, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single billing usage record as returned by the warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRow {
    pub day: NaiveDate,
    pub project_id: String,
    pub sku_id: String,
    pub sku_description: String,
    pub cost: Decimal,
    pub currency: String,
}

/// Total spend for one (day, project, SKU)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageBucket {
    pub day: NaiveDate,
    pub project_id: String,
    pub sku_id: String,
    pub sku_description: String,
    pub cost: Decimal,
}

/// Longest history a run may request, in days
pub const MAX_DAYS_TO_AVERAGE: u32 = 3650;

/// Inclusive range of billing days fetched for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LookbackWindow {
    /// Window of `days_to_average + 1` days ending at `evaluation_day`
    pub fn ending(evaluation_day: NaiveDate, days_to_average: u32) -> Result<Self, DataError> {
        let start = evaluation_day
            .checked_sub_days(Days::new(u64::from(days_to_average)))
            .ok_or(DataError::WindowOutOfRange {
                evaluation_day,
                days_to_average,
            })?;

        Ok(Self {
            start,
            end: evaluation_day,
        })
    }

    /// Number of days covered, both ends included
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }
}

/// The last fully closed billing day relative to `today`
pub fn evaluation_day_for(today: NaiveDate) -> NaiveDate {
    today - Duration::days(1)
}

/// Errors raised while validating fetched usage data
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("usage data mixes currencies ({first} and {other})")]
    MixedCurrency { first: String, other: String },

    #[error("{days_to_average} days before {evaluation_day} is out of the calendar range")]
    WindowOutOfRange {
        evaluation_day: NaiveDate,
        days_to_average: u32,
    },
}

/// Resolve the single currency shared by all rows.
///
/// Returns `Ok(None)` for an empty input.
pub fn resolve_currency(rows: &[UsageRow]) -> Result<Option<String>, DataError> {
    let mut rows = rows.iter();
    let Some(first) = rows.next() else {
        return Ok(None);
    };

    if let Some(other) = rows.find(|row| row.currency != first.currency) {
        return Err(DataError::MixedCurrency {
            first: first.currency.clone(),
            other: other.currency.clone(),
        });
    }

    Ok(Some(first.currency.clone()))
}
