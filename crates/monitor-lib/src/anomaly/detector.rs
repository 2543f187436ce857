//! Spend anomaly detector
//!
//! Compares the evaluation day's spend of each (project, SKU) series against
//! the rolling average and rolling maximum of every earlier day in the data.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::{AlertMetric, Anomaly, Baseline, ChangeType, PercentChange};
use crate::models::UsageBucket;

/// Default number of days the baselines are expected to cover
pub const DEFAULT_DAYS_TO_AVERAGE: u32 = 30;

/// Daily costs for one (project, SKU) pair
struct Series<'a> {
    project_id: &'a str,
    sku_id: &'a str,
    sku_description: &'a str,
    daily_costs: BTreeMap<NaiveDate, Decimal>,
}

/// Outcome of one detection pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub evaluation_day: NaiveDate,
    /// Ascending by absolute change
    pub anomalies: Vec<Anomaly>,
    /// Series that had both history and an evaluation-day bucket
    pub series_evaluated: usize,
    /// Distinct days before the evaluation day
    pub history_days: usize,
    /// Data sufficiency note for the alert
    pub pretext: Option<String>,
}

impl DetectionReport {
    pub fn has_anomalies(&self) -> bool {
        !self.anomalies.is_empty()
    }

    /// `false` when no series had both history and evaluation-day spend
    pub fn is_conclusive(&self) -> bool {
        self.history_days > 0 && self.series_evaluated > 0
    }
}

/// Detects evaluation-day spend exceeding historical baselines
#[derive(Debug, Clone)]
pub struct SpendAnomalyDetector {
    /// Expected history length, only used for the sufficiency note
    pub days_to_average: u32,
    /// Minimum absolute excess reported
    pub change_threshold: Decimal,
    /// Rules that run
    pub alert_metric: AlertMetric,
    /// Optional minimum percent excess reported
    pub min_percent_change: Option<Decimal>,
}

impl SpendAnomalyDetector {
    pub fn new(days_to_average: u32) -> Self {
        Self {
            days_to_average,
            ..Self::default()
        }
    }

    pub fn with_change_threshold(mut self, change_threshold: Decimal) -> Self {
        self.change_threshold = change_threshold;
        self
    }

    pub fn with_alert_metric(mut self, alert_metric: AlertMetric) -> Self {
        self.alert_metric = alert_metric;
        self
    }

    pub fn with_min_percent_change(mut self, min_percent_change: Option<Decimal>) -> Self {
        self.min_percent_change = min_percent_change;
        self
    }

    /// Run detection over aggregated buckets.
    ///
    /// Never fails: series without history or without an evaluation-day
    /// bucket are skipped, and empty input yields an empty report.
    pub fn detect(&self, buckets: &[UsageBucket], evaluation_day: NaiveDate) -> DetectionReport {
        let series = group_series(buckets);

        let mut anomalies = Vec::new();
        let mut series_evaluated = 0;

        for series in &series {
            let Some(&spend) = series.daily_costs.get(&evaluation_day) else {
                continue;
            };
            let history: Vec<Decimal> = series
                .daily_costs
                .range(..evaluation_day)
                .map(|(_, cost)| *cost)
                .collect();
            let Some(baseline) = Baseline::from_history(&history) else {
                continue;
            };

            series_evaluated += 1;
            for change_type in [ChangeType::Average, ChangeType::Max] {
                if let Some(anomaly) = self.check_rule(series, spend, &baseline, change_type) {
                    anomalies.push(anomaly);
                }
            }
        }

        // Stable: equal changes keep detection order
        anomalies.sort_by(|a, b| a.absolute_change.cmp(&b.absolute_change));

        let history_days = buckets
            .iter()
            .filter(|bucket| bucket.day < evaluation_day)
            .map(|bucket| bucket.day)
            .collect::<BTreeSet<_>>()
            .len();

        DetectionReport {
            evaluation_day,
            anomalies,
            series_evaluated,
            history_days,
            pretext: self.sufficiency_note(history_days),
        }
    }

    fn check_rule(
        &self,
        series: &Series<'_>,
        spend: Decimal,
        baseline: &Baseline,
        change_type: ChangeType,
    ) -> Option<Anomaly> {
        if !self.alert_metric.includes(change_type) {
            return None;
        }

        let reference = baseline.value(change_type);
        if spend <= reference {
            return None;
        }

        let delta = spend - reference;
        if delta < self.change_threshold {
            return None;
        }

        let percent_change = PercentChange::of(delta, reference);
        if let Some(minimum) = self.min_percent_change {
            if !percent_change.reaches(minimum) {
                return None;
            }
        }

        Some(Anomaly {
            project_id: series.project_id.to_string(),
            sku_id: series.sku_id.to_string(),
            sku_description: series.sku_description.to_string(),
            change_type,
            absolute_change: delta,
            percent_change: percent_change.rounded(),
            spend,
            baseline: reference,
        })
    }

    fn sufficiency_note(&self, history_days: usize) -> Option<String> {
        if history_days >= self.days_to_average as usize {
            return None;
        }
        Some(format!(
            "Only {}/{} days of data is available.",
            history_days, self.days_to_average
        ))
    }
}

impl Default for SpendAnomalyDetector {
    fn default() -> Self {
        Self {
            days_to_average: DEFAULT_DAYS_TO_AVERAGE,
            change_threshold: Decimal::ZERO,
            alert_metric: AlertMetric::All,
            min_percent_change: None,
        }
    }
}

/// Group buckets by (project, SKU), keeping first-appearance order
fn group_series(buckets: &[UsageBucket]) -> Vec<Series<'_>> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut series: Vec<Series<'_>> = Vec::new();

    for bucket in buckets {
        let key = (bucket.project_id.as_str(), bucket.sku_id.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            series.push(Series {
                project_id: &bucket.project_id,
                sku_id: &bucket.sku_id,
                sku_description: &bucket.sku_description,
                daily_costs: BTreeMap::new(),
            });
            series.len() - 1
        });
        *series[slot]
            .daily_costs
            .entry(bucket.day)
            .or_insert(Decimal::ZERO) += bucket.cost;
    }

    series
}
