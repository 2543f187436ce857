//! Slack mrkdwn rendering

use super::{format_amount, AlertMessage};
use crate::anomaly::Anomaly;

/// Render one line per anomaly, magnitudes in bold
pub fn render_markdown(message: &AlertMessage) -> String {
    message
        .entries
        .iter()
        .map(|anomaly| render_line(message, anomaly))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_line(message: &AlertMessage, anomaly: &Anomaly) -> String {
    format!(
        "• *{}* / {} ({}): spent {}, exceeded {} by *{}* (*{}%*)",
        escape(&anomaly.project_id),
        escape(&anomaly.sku_description),
        escape(&anomaly.sku_id),
        format_amount(anomaly.spend, &message.currency),
        message.metric_label(anomaly),
        format_amount(anomaly.absolute_change, &message.currency),
        anomaly.percent_change,
    )
}

/// Slack control characters
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
