//! Structured run logging
//!
//! Every milestone of a run is a single tracing event carrying an `event`
//! field, so the JSON log stream can be filtered like a metrics feed.

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::alert::{render_html, render_markdown, AlertMessage};
use crate::anomaly::{Anomaly, DetectionReport};
use crate::job::{JobSettings, RunOutcome};
use crate::models::{DataError, LookbackWindow};
use crate::warehouse::WarehouseError;

/// Emits the structured events of one monitor run
pub struct RunLogger {
    source: String,
}

impl RunLogger {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn log_run_started(&self, evaluation_day: NaiveDate, settings: &JobSettings) {
        info!(
            event = "run_started",
            source = %self.source,
            evaluation_day = %evaluation_day,
            days_to_average = settings.days_to_average,
            change_threshold = %settings.change_threshold,
            alert_metric = %settings.alert_metric,
            min_percent_change = ?settings.min_percent_change,
            dry_run = settings.dry_run,
            "Starting spend check"
        );
    }

    pub fn log_usage_fetched(&self, window: &LookbackWindow, rows: usize) {
        info!(
            event = "usage_fetched",
            source = %self.source,
            start_day = %window.start,
            end_day = %window.end,
            rows = rows,
            "Fetched usage rows"
        );
    }

    pub fn log_query_failed(&self, err: &WarehouseError) {
        error!(
            event = "query_failed",
            source = %self.source,
            error = %err,
            "Usage query failed"
        );
    }

    pub fn log_invalid_data(&self, err: &DataError) {
        error!(
            event = "invalid_data",
            source = %self.source,
            error = %err,
            "Usage data rejected"
        );
    }

    pub fn log_insufficient_data(&self, window: &LookbackWindow) {
        warn!(
            event = "insufficient_data",
            source = %self.source,
            start_day = %window.start,
            end_day = %window.end,
            "Not enough data to compare spend"
        );
    }

    pub fn log_detection(&self, report: &DetectionReport) {
        info!(
            event = "detection_completed",
            source = %self.source,
            evaluation_day = %report.evaluation_day,
            series = report.series_evaluated,
            history_days = report.history_days,
            anomalies = report.anomalies.len(),
            "Compared spend against baselines"
        );
    }

    pub fn log_anomaly(&self, anomaly: &Anomaly, currency: &str) {
        warn!(
            event = "anomaly_detected",
            source = %self.source,
            project_id = %anomaly.project_id,
            sku_id = %anomaly.sku_id,
            change_type = %anomaly.change_type,
            spend = %anomaly.spend,
            baseline = %anomaly.baseline,
            absolute_change = %anomaly.absolute_change,
            percent_change = %anomaly.percent_change,
            currency = %currency,
            "Spend limit exceeded"
        );
    }

    pub fn log_no_anomalies(&self, evaluation_day: NaiveDate) {
        info!(
            event = "no_anomalies",
            source = %self.source,
            evaluation_day = %evaluation_day,
            "No limits exceeded"
        );
    }

    pub fn log_dry_run(&self, message: &AlertMessage) {
        info!(
            event = "dry_run",
            source = %self.source,
            title = %message.title,
            body_title = %message.body_title,
            markdown = %render_markdown(message),
            html = %render_html(message),
            "Dry run, alert not delivered"
        );
    }

    pub fn log_run_completed(&self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Alerted { anomalies, delivery } => info!(
                event = "run_completed",
                source = %self.source,
                outcome = outcome.label(),
                anomalies = *anomalies,
                delivered = delivery.delivered(),
                failed = delivery.failed(),
                "Spend check finished"
            ),
            _ => info!(
                event = "run_completed",
                source = %self.source,
                outcome = outcome.label(),
                "Spend check finished"
            ),
        }
    }
}
