//! SendGrid email channel

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::{NotificationChannel, NotifyError};
use crate::alert::{render_html, AlertMessage};

/// Public SendGrid API endpoint
pub const DEFAULT_SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com";

/// Split a comma-separated recipient list, dropping blanks
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Sends the alert as an HTML email through the SendGrid v3 API
pub struct SendGridEmail {
    api_key: Option<String>,
    sender: Option<String>,
    recipients: Vec<String>,
    endpoint: Url,
    client: Client,
}

impl SendGridEmail {
    pub fn new(
        api_key: Option<String>,
        sender: Option<String>,
        recipients: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let endpoint = Url::parse(DEFAULT_SENDGRID_ENDPOINT)
            .map_err(|e| NotifyError::Endpoint(e.to_string()))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_key: api_key.filter(|s| !s.trim().is_empty()),
            sender: sender.filter(|s| !s.trim().is_empty()),
            recipients,
            endpoint,
            client,
        })
    }

    /// Override the API endpoint
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn credentials(&self) -> Result<(&str, &str), NotifyError> {
        let mut missing = Vec::new();
        if self.api_key.is_none() {
            missing.push("SENDGRID_API_KEY");
        }
        if self.sender.is_none() {
            missing.push("EMAIL_SOURCE");
        }
        if self.recipients.is_empty() {
            missing.push("EMAIL_RECIPIENTS");
        }

        match (&self.api_key, &self.sender) {
            (Some(key), Some(sender)) if missing.is_empty() => Ok((key.as_str(), sender.as_str())),
            _ => Err(NotifyError::MissingCredential(format!(
                "{} not set",
                missing.join(", ")
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: String,
}

#[async_trait]
impl NotificationChannel for SendGridEmail {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        let (api_key, sender) = self.credentials()?;
        let url = self
            .endpoint
            .join("v3/mail/send")
            .map_err(|e| NotifyError::Endpoint(e.to_string()))?;

        let request = MailRequest {
            personalizations: vec![Personalization {
                to: self
                    .recipients
                    .iter()
                    .map(|email| Address {
                        email: email.as_str(),
                    })
                    .collect(),
            }],
            from: Address { email: sender },
            subject: &message.title,
            content: vec![Content {
                kind: "text/html",
                value: render_html(message),
            }],
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
