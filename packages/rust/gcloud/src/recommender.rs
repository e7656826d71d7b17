//! Recommendation source backed by the `gcloud recommender` CLI.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, instrument};

use svcaudit_shared::{AuditError, Result};

use crate::RecommendationSource;
use crate::exec::{require_success, run_with_timeout};

/// Insight type listing service-account inactivity findings.
const INSIGHT_TYPE: &str = "google.iam.serviceAccount.Insight";

/// API that must be enabled before the insight listing can succeed.
const RECOMMENDER_API: &str = "recommender.googleapis.com";

/// Lists IAM service-account insights per project via `gcloud`.
pub struct GcloudRecommender {
    timeout: Duration,
}

impl GcloudRecommender {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Idempotent enable of the recommender API. A failure here is not
    /// fatal — the listing call will surface the real error if the API
    /// is genuinely unusable.
    #[instrument(skip(self))]
    async fn enable_api_if_needed(&self, project_id: &str) {
        let mut cmd = Command::new("gcloud");
        cmd.args(["services", "enable", RECOMMENDER_API])
            .args(["--project", project_id])
            .arg("--quiet");

        match run_with_timeout(&mut cmd, self.timeout, "services enable").await {
            Ok(output) if output.status.success() => {
                debug!(project_id, "recommender API enabled (or already on)");
            }
            Ok(output) => {
                debug!(
                    project_id,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "enable call declined, continuing"
                );
            }
            Err(e) => debug!(project_id, error = %e, "enable call failed, continuing"),
        }
    }

    async fn list(&self, project_id: &str) -> Result<Vec<Value>> {
        self.enable_api_if_needed(project_id).await;

        let mut cmd = Command::new("gcloud");
        cmd.args(["recommender", "insights", "list"])
            .arg(format!("--insight-type={INSIGHT_TYPE}"))
            .args(["--project", project_id])
            .args(["--location", "global"])
            .arg("--quiet")
            .args(["--format", "json"]);

        let output = run_with_timeout(&mut cmd, self.timeout, "insights list").await?;
        require_success(&output, "insights list")?;

        parse_insight_list(&output.stdout)
    }
}

impl RecommendationSource for GcloudRecommender {
    fn list_recommendations(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send {
        self.list(project_id)
    }
}

/// Parse `gcloud --format=json` stdout as an array of insight objects.
fn parse_insight_list(stdout: &[u8]) -> Result<Vec<Value>> {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(insights)) => Ok(insights),
        Ok(other) => Err(AuditError::parse(format!(
            "insight listing is not a JSON array (got {})",
            type_name(&other)
        ))),
        Err(e) => Err(AuditError::parse(format!(
            "insight listing is not valid JSON: {e}"
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insight_array() {
        let stdout = br#"[{"description": "Service account was inactive."}, {"description": "x"}]"#;
        let insights = parse_insight_list(stdout).unwrap();
        assert_eq!(insights.len(), 2);
    }

    #[test]
    fn empty_stdout_is_empty_list() {
        assert!(parse_insight_list(b"").unwrap().is_empty());
        assert!(parse_insight_list(b"  \n").unwrap().is_empty());
    }

    #[test]
    fn non_array_json_is_rejected() {
        let err = parse_insight_list(br#"{"error": "nope"}"#).unwrap_err();
        assert!(err.to_string().contains("not a JSON array"));
    }

    #[test]
    fn invalid_json_is_rejected() {
        let err = parse_insight_list(b"ERROR: not json").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
