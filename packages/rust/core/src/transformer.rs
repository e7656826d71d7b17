//! Stage 2: normalize raw recommendation payloads into account records.
//!
//! Pure and deterministic: no external calls, no concurrency. A
//! malformed payload block is skipped with a warning and never aborts
//! the batch.

use serde_json::Value;
use tracing::{debug, warn};

use svcaudit_shared::{
    AccountRecord, INACTIVITY_MARKER, InactivityFlag, ProjectPayload, normalize_timestamp,
};

/// Parse every payload line into zero or more normalized records.
pub fn transform(lines: &[String]) -> Vec<AccountRecord> {
    let mut records = Vec::new();

    for line in lines {
        let payload: ProjectPayload = match serde_json::from_str(line) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "skipping malformed payload block");
                continue;
            }
        };

        if let Some(error) = &payload.error {
            warn!(
                project_id = %payload.project_id,
                error,
                "project carried a collection error, no records"
            );
            continue;
        }

        let insights = payload.insights.unwrap_or_default();
        for insight in &insights {
            if let Some(record) = record_from_insight(&payload.project_id, insight) {
                records.push(record);
            }
        }
    }

    debug!(records = records.len(), "transform complete");
    records
}

/// Build one record from an insight object. Insights without an
/// account email identify nothing auditable and are dropped.
fn record_from_insight(project_id: &str, insight: &Value) -> Option<AccountRecord> {
    let content = insight.get("content")?;
    let email = content.get("email").and_then(Value::as_str)?;

    let description = insight
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let inactivity_flag = if description.contains(INACTIVITY_MARKER) {
        InactivityFlag::Yes
    } else {
        InactivityFlag::No
    };

    let last_authenticated_at =
        normalize_timestamp(content.get("lastAuthenticatedTime").and_then(Value::as_str));

    let account_id = content
        .get("serviceAccountId")
        .and_then(Value::as_str)
        .map(String::from);

    Some(AccountRecord {
        project_id: project_id.to_string(),
        account_email: email.to_string(),
        account_id,
        inactivity_flag,
        last_authenticated_at,
        recent_activity: None,
        liveness_state: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload_line(project_id: &str, insights: Vec<Value>) -> String {
        serde_json::to_string(&ProjectPayload::ok(project_id, insights)).unwrap()
    }

    #[test]
    fn inactive_insight_becomes_flagged_record() {
        let lines = vec![payload_line(
            "my-project",
            vec![json!({
                "description": "Service account was inactive.",
                "content": {
                    "email": "sa@my-project.iam.gserviceaccount.com",
                    "serviceAccountId": "109876543210",
                    "lastAuthenticatedTime": "2024-01-01T00:00:00Z"
                }
            })],
        )];

        let records = transform(&lines);
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.project_id, "my-project");
        assert_eq!(rec.inactivity_flag, InactivityFlag::Yes);
        assert_eq!(rec.last_authenticated_at, "2024-01-01 00:00:00");
        assert_eq!(rec.account_id.as_deref(), Some("109876543210"));
    }

    #[test]
    fn active_insight_is_not_flagged() {
        let lines = vec![payload_line(
            "p",
            vec![json!({
                "description": "Service account is in use.",
                "content": {"email": "sa@p.iam.gserviceaccount.com"}
            })],
        )];

        let records = transform(&lines);
        assert_eq!(records[0].inactivity_flag, InactivityFlag::No);
        assert_eq!(records[0].last_authenticated_at, "N/A");
        assert!(records[0].account_id.is_none());
    }

    #[test]
    fn malformed_blocks_are_skipped_not_fatal() {
        let lines = vec![
            "{ not json at all".to_string(),
            payload_line(
                "p",
                vec![json!({
                    "description": "was inactive.",
                    "content": {"email": "a@p.iam.gserviceaccount.com"}
                })],
            ),
        ];

        let records = transform(&lines);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn error_payloads_and_emailless_insights_yield_no_records() {
        let error_line =
            serde_json::to_string(&ProjectPayload::failed("p", "listing failed")).unwrap();
        let lines = vec![
            error_line,
            payload_line("q", vec![json!({"description": "no content here"})]),
            payload_line("q", vec![json!({"content": {"serviceAccountId": "1"}})]),
        ];

        assert!(transform(&lines).is_empty());
    }

    #[test]
    fn unparseable_timestamp_displays_na() {
        let lines = vec![payload_line(
            "p",
            vec![json!({
                "description": "was inactive.",
                "content": {
                    "email": "a@p.iam.gserviceaccount.com",
                    "lastAuthenticatedTime": "January 1st"
                }
            })],
        )];

        assert_eq!(transform(&lines)[0].last_authenticated_at, "N/A");
    }

    #[test]
    fn transform_is_deterministic() {
        let lines = vec![payload_line(
            "p",
            vec![
                json!({
                    "description": "was inactive.",
                    "content": {"email": "a@p.iam.gserviceaccount.com"}
                }),
                json!({
                    "description": "fine",
                    "content": {"email": "b@p.iam.gserviceaccount.com"}
                }),
            ],
        )];

        let first = transform(&lines);
        let second = transform(&lines);
        assert_eq!(first, second);
    }
}
