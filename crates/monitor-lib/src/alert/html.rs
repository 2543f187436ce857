//! HTML rendering for email

use super::{format_amount, AlertMessage};

const TABLE_HEADERS: [&str; 7] = [
    "Project",
    "SKU ID",
    "SKU description",
    "Day's spend",
    "Metric exceeded",
    "Exceeded by",
    "Exceeded by (%)",
];

/// Render the message as an HTML document with one table row per anomaly
pub fn render_html(message: &AlertMessage) -> String {
    let mut html = String::new();

    html.push_str("<html><body>\n");
    html.push_str(&format!("<h2>{}</h2>\n", escape(&message.title)));
    if let Some(pretext) = &message.pretext {
        html.push_str(&format!("<p><em>{}</em></p>\n", escape(pretext)));
    }
    html.push_str(&format!("<h3>{}</h3>\n", escape(&message.body_title)));

    html.push_str("<table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">\n<tr>");
    for header in TABLE_HEADERS {
        html.push_str(&format!("<th>{}</th>", header));
    }
    html.push_str("</tr>\n");

    for anomaly in &message.entries {
        let cells = [
            escape(&anomaly.project_id),
            escape(&anomaly.sku_id),
            escape(&anomaly.sku_description),
            escape(&format_amount(anomaly.spend, &message.currency)),
            escape(&message.metric_label(anomaly)),
            escape(&format_amount(anomaly.absolute_change, &message.currency)),
            format!("{}%", anomaly.percent_change),
        ];

        html.push_str("<tr>");
        for cell in cells {
            html.push_str(&format!("<td>{}</td>", cell));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</table>\n</body></html>\n");
    html
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::test_support::{anomaly, message};
    use crate::anomaly::{ChangeType, PercentChange};
    use rust_decimal_macros::dec;

    #[test]
    fn test_table_row_per_anomaly() {
        let msg = message(
            vec![
                anomaly("proj-a", "sku-1", ChangeType::Average, dec!(15)),
                anomaly("proj-a", "sku-1", ChangeType::Max, dec!(15)),
            ],
            None,
        );

        let html = render_html(&msg);

        assert_eq!(html.matches("<tr>").count(), 3);
        assert!(html.contains("<th>Metric exceeded</th>"));
        assert!(html.contains(
            "<tr><td>proj-a</td><td>sku-1</td><td>sku-1 usage</td><td>25.00 USD</td>\
             <td>30-day average</td><td>15.00 USD</td><td>150.00%</td></tr>"
        ));
        assert!(html.contains("<td>30-day max</td>"));
        assert!(!html.contains("<em>"));
    }

    #[test]
    fn test_document_layout() {
        let html = render_html(&message(vec![], None));

        assert!(html.starts_with(
            "<html><body>\n<h2>GCP billing alert for 2024-06-04</h2>\n\
             <h3>1 SKU exceeded spend limits</h3>\n<table"
        ));
        assert!(html.ends_with("</tr>\n</table>\n</body></html>\n"));
    }

    #[test]
    fn test_pretext_and_infinite_percent() {
        let mut entry = anomaly("proj", "sku", ChangeType::Average, dec!(2));
        entry.percent_change = PercentChange::Infinite;
        let msg = message(vec![entry], Some("Only 5/30 days of data is available."));

        let html = render_html(&msg);

        assert!(html.contains("<p><em>Only 5/30 days of data is available.</em></p>"));
        assert!(html.contains("<td>inf%</td>"));
    }

    #[test]
    fn test_rows_follow_entry_order() {
        let msg = message(
            vec![
                anomaly("proj", "first", ChangeType::Average, dec!(99)),
                anomaly("proj", "second", ChangeType::Average, dec!(1)),
            ],
            None,
        );

        let html = render_html(&msg);
        let first = html.find("<td>first</td>").unwrap();
        let second = html.find("<td>second</td>").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_escapes_text() {
        let mut entry = anomaly("proj", "sku", ChangeType::Average, dec!(1));
        entry.sku_description = "<script>\"x\" & 'y'</script>".to_string();

        let html = render_html(&message(vec![entry], None));
        assert!(html.contains("&lt;script&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
