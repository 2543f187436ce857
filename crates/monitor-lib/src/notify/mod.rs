//! Notification delivery
//!
//! Handles:
//! - The [`NotificationChannel`] trait implemented by each sink
//! - Slack incoming webhook and SendGrid email sinks
//! - Best-effort dispatch: every channel is attempted, failures are logged
//!   and reported, never propagated

mod sendgrid;
mod slack;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::alert::AlertMessage;

pub use sendgrid::{parse_recipients, SendGridEmail, DEFAULT_SENDGRID_ENDPOINT};
pub use slack::SlackWebhook;

/// Errors raised by a single notification channel
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("missing credentials: {0}")]
    MissingCredential(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response body: {0}")]
    UnexpectedBody(String),

    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

/// A sink that delivers alert messages
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name
    fn name(&self) -> &str;

    /// Deliver one message
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError>;
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub channel: String,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcomes of a dispatch across all channels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

/// Sends a message to every configured channel in order
#[derive(Default)]
pub struct Dispatcher {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Box<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Attempt delivery on every channel. A failing channel never stops
    /// the remaining ones.
    pub async fn dispatch(&self, message: &AlertMessage) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for channel in &self.channels {
            let error = match channel.send(message).await {
                Ok(()) => {
                    info!(
                        event = "notification_sent",
                        channel = channel.name(),
                        billing_date = %message.billing_date,
                        "Sent billing alert"
                    );
                    None
                }
                Err(e) => {
                    warn!(
                        event = "notification_failed",
                        channel = channel.name(),
                        error = %e,
                        "Failed to send billing alert"
                    );
                    Some(e.to_string())
                }
            };

            report.outcomes.push(DeliveryOutcome {
                channel: channel.name().to_string(),
                error,
            });
        }

        report
    }
}
