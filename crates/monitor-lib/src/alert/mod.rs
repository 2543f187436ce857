//! Alert message construction and rendering
//!
//! The detector's ordered anomalies are reshaped into an [`AlertMessage`]
//! and rendered per channel:
//! - Slack mrkdwn lines for the chat webhook
//! - An HTML table for email

mod html;
mod markdown;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::anomaly::{Anomaly, DetectionReport};

pub use html::render_html;
pub use markdown::render_markdown;

/// Message delivered to every notification channel for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    pub title: String,
    pub body_title: String,
    pub pretext: Option<String>,
    /// In detector order
    pub entries: Vec<Anomaly>,
    pub billing_date: NaiveDate,
    pub currency: String,
    pub days_to_average: u32,
}

impl AlertMessage {
    /// Reshape a detection report for delivery
    pub fn build(report: &DetectionReport, currency: &str, days_to_average: u32) -> Self {
        let skus = report
            .anomalies
            .iter()
            .map(|a| (a.project_id.as_str(), a.sku_id.as_str()))
            .collect::<std::collections::HashSet<_>>()
            .len();

        Self {
            title: format!("GCP billing alert for {}", report.evaluation_day),
            body_title: format!(
                "{} SKU{} exceeded spend limits",
                skus,
                if skus == 1 { "" } else { "s" }
            ),
            pretext: report.pretext.clone(),
            entries: report.anomalies.clone(),
            billing_date: report.evaluation_day,
            currency: currency.to_string(),
            days_to_average,
        }
    }

    /// Label of the exceeded metric, e.g. `30-day average`
    pub fn metric_label(&self, anomaly: &Anomaly) -> String {
        format!("{}-day {}", self.days_to_average, anomaly.change_type)
    }
}

/// Amount at 2 decimal places with currency
pub(crate) fn format_amount(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {}", amount.round_dp(2), currency)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::anomaly::{ChangeType, PercentChange};
    use rust_decimal_macros::dec;

    pub fn anomaly(project: &str, sku: &str, change_type: ChangeType, change: Decimal) -> Anomaly {
        Anomaly {
            project_id: project.to_string(),
            sku_id: sku.to_string(),
            sku_description: format!("{} usage", sku),
            change_type,
            absolute_change: change,
            percent_change: PercentChange::Finite(dec!(150.0)),
            spend: dec!(25),
            baseline: dec!(10),
        }
    }

    pub fn message(entries: Vec<Anomaly>, pretext: Option<&str>) -> AlertMessage {
        AlertMessage {
            title: "GCP billing alert for 2024-06-04".to_string(),
            body_title: "1 SKU exceeded spend limits".to_string(),
            pretext: pretext.map(str::to_string),
            entries,
            billing_date: NaiveDate::from_ymd_opt(2024, 6, 4).unwrap(),
            currency: "USD".to_string(),
            days_to_average: 30,
        }
    }
}
