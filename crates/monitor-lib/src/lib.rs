//! Cloud spend anomaly detection
//!
//! This crate provides the core functionality for:
//! - Fetching daily usage from a BigQuery billing export (or a JSON file)
//! - Aggregating usage per day, project and SKU
//! - Comparing the latest day against rolling average and maximum baselines
//! - Rendering alerts for Slack and email
//! - Best-effort delivery to every configured channel

pub mod aggregator;
pub mod alert;
pub mod anomaly;
pub mod job;
pub mod models;
pub mod notify;
pub mod observability;
pub mod warehouse;

pub use alert::AlertMessage;
pub use anomaly::{AlertMetric, Anomaly, ChangeType, DetectionReport, SpendAnomalyDetector};
pub use job::{analyze, run, Analysis, AnalysisError, JobSettings, RunOutcome};
pub use models::*;
pub use notify::{Dispatcher, NotificationChannel};
pub use observability::RunLogger;
pub use warehouse::UsageSource;
