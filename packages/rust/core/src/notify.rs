//! Slack webhook notification for completed audit runs.
//!
//! Delivery is best-effort: a failed notification is logged and never
//! fails the run that produced the report.

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::pipeline::AuditResult;

/// Build the Block Kit message body for a completed run.
pub fn build_blocks(date: &str, result: &AuditResult) -> Value {
    json!([
        {
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": "🚀 Service Account Analysis Report",
                "emoji": true
            }
        },
        {
            "type": "section",
            "fields": [
                {
                    "type": "mrkdwn",
                    "text": format!("*Date:*\n{date}")
                },
                {
                    "type": "mrkdwn",
                    "text": format!("*Total Time Taken:*\n{:.2} seconds", result.elapsed.as_secs_f64())
                }
            ]
        },
        { "type": "divider" },
        {
            "type": "section",
            "fields": [
                {
                    "type": "mrkdwn",
                    "text": format!("*Number of Unused Service Accounts:*\n{}", result.flagged)
                }
            ]
        },
        { "type": "divider" },
        {
            "type": "context",
            "elements": [
                {
                    "type": "mrkdwn",
                    "text": "✅ Analysis completed successfully."
                }
            ]
        }
    ])
}

/// Post the run summary to a Slack incoming webhook.
///
/// Never returns an error: notification failures are observability
/// problems, not audit failures.
pub async fn send_report(client: &Client, webhook_url: &str, result: &AuditResult) {
    let date = chrono::Local::now().format("%Y-%m-%d").to_string();
    let payload = json!({ "blocks": build_blocks(&date, result) });

    match client.post(webhook_url).json(&payload).send().await {
        Ok(response) if response.status().is_success() => {
            info!("slack notification delivered");
        }
        Ok(response) => {
            warn!(status = %response.status(), "slack webhook rejected notification");
        }
        Err(e) => {
            warn!(error = %e, "failed to send slack notification");
        }
    }
}
