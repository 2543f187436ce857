//! One batch run of the spend monitor
//!
//! Fetch the lookback window, aggregate, detect, then alert. Every failure
//! past configuration is logged and turned into a [`RunOutcome`]; a run never
//! returns an error.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::aggregator::aggregate;
use crate::alert::AlertMessage;
use crate::anomaly::{AlertMetric, DetectionReport, SpendAnomalyDetector};
use crate::models::{evaluation_day_for, resolve_currency, DataError, LookbackWindow};
use crate::notify::{DeliveryReport, Dispatcher};
use crate::observability::RunLogger;
use crate::warehouse::{UsageSource, WarehouseError};

/// Detection and delivery settings for a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSettings {
    pub days_to_average: u32,
    pub change_threshold: Decimal,
    pub alert_metric: AlertMetric,
    pub min_percent_change: Option<Decimal>,
    /// Render and log the alert instead of delivering it
    pub dry_run: bool,
}

impl JobSettings {
    pub fn detector(&self) -> SpendAnomalyDetector {
        SpendAnomalyDetector::new(self.days_to_average)
            .with_change_threshold(self.change_threshold)
            .with_alert_metric(self.alert_metric)
            .with_min_percent_change(self.min_percent_change)
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        let detector = SpendAnomalyDetector::default();
        Self {
            days_to_average: detector.days_to_average,
            change_threshold: detector.change_threshold,
            alert_metric: detector.alert_metric,
            min_percent_change: detector.min_percent_change,
            dry_run: false,
        }
    }
}

/// Errors that end an analysis before detection
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Detection result for one evaluation day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub window: LookbackWindow,
    pub row_count: usize,
    /// `None` when no rows were fetched
    pub currency: Option<String>,
    pub report: DetectionReport,
}

/// Fetch, validate, aggregate and detect for `evaluation_day`
pub async fn analyze(
    source: &dyn UsageSource,
    settings: &JobSettings,
    evaluation_day: NaiveDate,
) -> Result<Analysis, AnalysisError> {
    let window = LookbackWindow::ending(evaluation_day, settings.days_to_average)?;
    let rows = source.fetch(window).await?;
    let currency = resolve_currency(&rows)?;

    let buckets = aggregate(&rows);
    let report = settings.detector().detect(&buckets, evaluation_day);

    Ok(Analysis {
        window,
        row_count: rows.len(),
        currency,
        report,
    })
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    QueryFailed { reason: String },
    InvalidData { reason: String },
    InsufficientData,
    NoAnomalies { history_days: usize },
    DryRun { anomalies: usize },
    Alerted { anomalies: usize, delivery: DeliveryReport },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::QueryFailed { .. } => "query_failed",
            RunOutcome::InvalidData { .. } => "invalid_data",
            RunOutcome::InsufficientData => "insufficient_data",
            RunOutcome::NoAnomalies { .. } => "no_anomalies",
            RunOutcome::DryRun { .. } => "dry_run",
            RunOutcome::Alerted { .. } => "alerted",
        }
    }
}

/// Run the job once for the day before `today`
pub async fn run(
    source: &dyn UsageSource,
    dispatcher: &Dispatcher,
    settings: &JobSettings,
    today: NaiveDate,
) -> RunOutcome {
    let logger = RunLogger::new(source.name());
    let evaluation_day = evaluation_day_for(today);
    logger.log_run_started(evaluation_day, settings);

    let outcome = evaluate(source, dispatcher, settings, evaluation_day, &logger).await;

    logger.log_run_completed(&outcome);
    outcome
}

async fn evaluate(
    source: &dyn UsageSource,
    dispatcher: &Dispatcher,
    settings: &JobSettings,
    evaluation_day: NaiveDate,
    logger: &RunLogger,
) -> RunOutcome {
    let analysis = match analyze(source, settings, evaluation_day).await {
        Ok(analysis) => analysis,
        Err(AnalysisError::Warehouse(e)) => {
            logger.log_query_failed(&e);
            return RunOutcome::QueryFailed {
                reason: e.to_string(),
            };
        }
        Err(AnalysisError::Data(e)) => {
            logger.log_invalid_data(&e);
            return RunOutcome::InvalidData {
                reason: e.to_string(),
            };
        }
    };

    logger.log_usage_fetched(&analysis.window, analysis.row_count);
    let Some(currency) = analysis.currency else {
        logger.log_insufficient_data(&analysis.window);
        return RunOutcome::InsufficientData;
    };

    let report = analysis.report;
    logger.log_detection(&report);

    if !report.is_conclusive() {
        logger.log_insufficient_data(&analysis.window);
        return RunOutcome::InsufficientData;
    }

    for anomaly in &report.anomalies {
        logger.log_anomaly(anomaly, &currency);
    }

    if !report.has_anomalies() {
        logger.log_no_anomalies(evaluation_day);
        return RunOutcome::NoAnomalies {
            history_days: report.history_days,
        };
    }

    let message = AlertMessage::build(&report, &currency, settings.days_to_average);
    let anomalies = message.entries.len();

    if settings.dry_run {
        logger.log_dry_run(&message);
        return RunOutcome::DryRun { anomalies };
    }

    let delivery = dispatcher.dispatch(&message).await;
    RunOutcome::Alerted {
        anomalies,
        delivery,
    }
}
