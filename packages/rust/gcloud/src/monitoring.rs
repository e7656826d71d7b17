//! Telemetry source backed by the Cloud Monitoring REST API.
//!
//! Queries the `authn_events_count` metric for a service account's
//! stable unique id over a trailing window. Authentication piggybacks
//! on the ambient gcloud credential via `gcloud auth
//! print-access-token`, so the audit needs no key files of its own.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use svcaudit_shared::{AuditError, Result};

use crate::TelemetrySource;
use crate::exec::{require_success, run_with_timeout};

/// Metric counting authentication events per service account.
const AUTHN_METRIC: &str = "iam.googleapis.com/service_account/authn_events_count";

/// Queries Cloud Monitoring time series for account activity.
pub struct MonitoringApi {
    client: reqwest::Client,
    window_days: u32,
    timeout: Duration,
}

impl MonitoringApi {
    /// Build the API client with a bounded request timeout.
    pub fn new(window_days: u32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("svcaudit/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AuditError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            window_days,
            timeout,
        })
    }

    /// Fetch a bearer token from the ambient gcloud credential.
    async fn access_token(&self) -> Result<String> {
        let mut cmd = Command::new("gcloud");
        cmd.args(["auth", "print-access-token", "--quiet"]);

        let output = run_with_timeout(&mut cmd, self.timeout, "print-access-token").await?;
        require_success(&output, "print-access-token")?;

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(AuditError::Command(
                "print-access-token: empty token".into(),
            ));
        }
        Ok(token)
    }

    async fn query(&self, project_id: &str, unique_id: &str) -> Result<bool> {
        let token = self.access_token().await?;
        let (start, end) = window_bounds(Utc::now(), self.window_days);
        let filter = authn_filter(unique_id);

        let url = format!("https://monitoring.googleapis.com/v3/projects/{project_id}/timeSeries");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("filter", filter.as_str()),
                ("interval.startTime", start.as_str()),
                ("interval.endTime", end.as_str()),
                ("view", "FULL"),
            ])
            .send()
            .await
            .map_err(|e| AuditError::Network(format!("monitoring query: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuditError::Network(format!(
                "monitoring query: HTTP {status}: {}",
                body.trim()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuditError::Network(format!("monitoring response body: {e}")))?;

        let active = has_time_series(&body);
        debug!(project_id, unique_id, active, "telemetry query done");
        Ok(active)
    }
}

impl TelemetrySource for MonitoringApi {
    fn recent_activity(
        &self,
        project_id: &str,
        unique_id: &str,
    ) -> impl Future<Output = Result<bool>> + Send {
        self.query(project_id, unique_id)
    }
}

/// Time-series filter for one account's authentication events.
fn authn_filter(unique_id: &str) -> String {
    format!(r#"metric.type = "{AUTHN_METRIC}" AND resource.labels.unique_id = "{unique_id}""#)
}

/// RFC 3339 interval bounds for the trailing window ending at `now`.
fn window_bounds(now: DateTime<Utc>, window_days: u32) -> (String, String) {
    let start = now - chrono::Duration::days(i64::from(window_days));
    (
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

/// Whether the listing response carries at least one time series.
fn has_time_series(body: &Value) -> bool {
    body.get("timeSeries")
        .and_then(Value::as_array)
        .is_some_and(|series| !series.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filter_includes_metric_and_id() {
        let filter = authn_filter("112233445566");
        assert!(filter.contains(AUTHN_METRIC));
        assert!(filter.contains(r#"resource.labels.unique_id = "112233445566""#));
    }

    #[test]
    fn window_bounds_trailing_days() {
        let now = Utc.with_ymd_and_hms(2024, 4, 10, 12, 0, 0).unwrap();
        let (start, end) = window_bounds(now, 90);
        assert_eq!(end, "2024-04-10T12:00:00Z");
        assert_eq!(start, "2024-01-11T12:00:00Z");
    }

    #[test]
    fn time_series_presence() {
        let with_points: Value =
            serde_json::json!({"timeSeries": [{"points": [{"value": {"int64Value": "3"}}]}]});
        assert!(has_time_series(&with_points));

        let empty: Value = serde_json::json!({"timeSeries": []});
        assert!(!has_time_series(&empty));

        // Zero matches: the API omits the field entirely.
        let absent: Value = serde_json::json!({});
        assert!(!has_time_series(&absent));
    }
}
