//! Slack incoming webhook channel

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{NotificationChannel, NotifyError};
use crate::alert::{render_markdown, AlertMessage};

/// Posts the alert as a single Slack attachment
pub struct SlackWebhook {
    webhook_url: Option<String>,
    client: Client,
}

impl SlackWebhook {
    /// A channel without a webhook URL fails every send with
    /// [`NotifyError::MissingCredential`]
    pub fn new(webhook_url: Option<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            webhook_url: webhook_url.filter(|url| !url.trim().is_empty()),
            client,
        })
    }

    fn payload(message: &AlertMessage) -> serde_json::Value {
        json!({
            "attachments": [{
                "mrkdwn_in": ["text"],
                "color": "warning",
                "title": message.title,
                "pretext": message.pretext.as_deref().unwrap_or_default(),
                "fields": [{
                    "title": message.body_title,
                    "value": render_markdown(message),
                    "short": false,
                }],
            }]
        })
    }
}

#[async_trait]
impl NotificationChannel for SlackWebhook {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        let url = self
            .webhook_url
            .as_deref()
            .ok_or_else(|| NotifyError::MissingCredential("SLACK_WEBHOOK_URL is not set".into()))?;

        let response = self
            .client
            .post(url)
            .json(&Self::payload(message))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status != reqwest::StatusCode::OK {
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim() != "ok" {
            return Err(NotifyError::UnexpectedBody(body));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::test_support::{anomaly, message};
    use crate::anomaly::ChangeType;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    fn alert() -> AlertMessage {
        message(
            vec![anomaly("proj-a", "sku-1", ChangeType::Average, dec!(15))],
            Some("Only 5/30 days of data is available."),
        )
    }

    fn channel(url: Option<String>) -> SlackWebhook {
        SlackWebhook::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_posts_attachment() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/services/T000/B000/XXX")
            .match_body(Matcher::PartialJson(json!({
                "attachments": [{
                    "mrkdwn_in": ["text"],
                    "color": "warning",
                    "title": "GCP billing alert for 2024-06-04",
                    "pretext": "Only 5/30 days of data is available.",
                    "fields": [{"title": "1 SKU exceeded spend limits", "short": false}]
                }]
            })))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let channel = channel(Some(format!("{}/services/T000/B000/XXX", server.url())));
        channel.send(&alert()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_webhook_url() {
        let err = channel(None).send(&alert()).await.unwrap_err();
        assert!(matches!(err, NotifyError::MissingCredential(_)));

        let err = channel(Some("  ".to_string())).send(&alert()).await.unwrap_err();
        assert!(matches!(err, NotifyError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn test_unexpected_body_is_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(200)
            .with_body("invalid_payload")
            .create_async()
            .await;

        let err = channel(Some(format!("{}/hook", server.url())))
            .send(&alert())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::UnexpectedBody(body) if body == "invalid_payload"));
    }

    #[tokio::test]
    async fn test_error_status_is_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(404)
            .with_body("no_team")
            .create_async()
            .await;

        let err = channel(Some(format!("{}/hook", server.url())))
            .send(&alert())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Status { status: 404, .. }));
    }
}
