//! Stage 1: per-project recommendation collection.
//!
//! Fans out one task per project, captures each external-call failure
//! as an error payload instead of aborting sibling projects, and
//! persists every payload to the intermediate store so later stages do
//! not depend on this stage's lifetime.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use svcaudit_gcloud::{RecommendationSource, with_backoff};
use svcaudit_shared::{ProjectPayload, RetryConfig};
use svcaudit_sink::PayloadStore;

/// Collection summary: payloads stored with insights vs. with errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub projects_ok: usize,
    pub projects_failed: usize,
}

/// Collect recommendations for every project concurrently.
///
/// Each task writes exactly one payload block — success or captured
/// error — so the store always accounts for every project that a task
/// finished for. A store-append failure loses that one project and is
/// logged; siblings continue.
#[instrument(skip_all, fields(projects = projects.len()))]
pub async fn collect<S>(
    projects: &[String],
    source: Arc<S>,
    store: Arc<PayloadStore>,
    retry: &RetryConfig,
) -> CollectStats
where
    S: RecommendationSource + 'static,
{
    let mut handles = Vec::with_capacity(projects.len());

    for project_id in projects {
        let project_id = project_id.clone();
        let source = source.clone();
        let store = store.clone();
        let retry = retry.clone();

        handles.push(tokio::spawn(async move {
            let listed = with_backoff(&retry, "insights list", || {
                source.list_recommendations(&project_id)
            })
            .await;

            let (payload, ok) = match listed {
                Ok(insights) => {
                    info!(project_id, insights = insights.len(), "project collected");
                    (ProjectPayload::ok(&project_id, insights), true)
                }
                Err(e) => {
                    warn!(project_id, error = %e, "collection failed, capturing error payload");
                    (ProjectPayload::failed(&project_id, e.to_string()), false)
                }
            };

            match store.append(&payload).await {
                Ok(()) => ok,
                Err(e) => {
                    warn!(project_id, error = %e, "payload append failed");
                    false
                }
            }
        }));
    }

    let mut stats = CollectStats {
        projects_ok: 0,
        projects_failed: 0,
    };

    for handle in handles {
        match handle.await {
            Ok(true) => stats.projects_ok += 1,
            Ok(false) => stats.projects_failed += 1,
            Err(e) => {
                warn!(error = %e, "collector task panicked");
                stats.projects_failed += 1;
            }
        }
    }

    info!(
        ok = stats.projects_ok,
        failed = stats.projects_failed,
        "collection complete"
    );

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};
    use svcaudit_shared::{Result, RunId};

    /// Fake source: fails for project ids containing "bad".
    struct FakeSource {
        calls: AtomicUsize,
    }

    impl RecommendationSource for FakeSource {
        fn list_recommendations(
            &self,
            project_id: &str,
        ) -> impl Future<Output = Result<Vec<Value>>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = project_id.contains("bad");
            let project_id = project_id.to_string();
            async move {
                if failing {
                    Err(svcaudit_shared::AuditError::Command(format!(
                        "insights list: denied for {project_id}"
                    )))
                } else {
                    Ok(vec![json!({"description": "Service account was inactive."})])
                }
            }
        }
    }

    fn no_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn every_project_lands_in_the_store() {
        let dir = std::env::temp_dir().join(format!("svcaudit-collect-{}", RunId::new()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("payloads.jsonl");

        let projects = vec![
            "proj-a".to_string(),
            "proj-bad".to_string(),
            "proj-c".to_string(),
        ];
        let source = Arc::new(FakeSource {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(PayloadStore::create(&path).unwrap());

        let stats = collect(&projects, source.clone(), store, &no_retry()).await;
        assert_eq!(stats.projects_ok, 2);
        assert_eq!(stats.projects_failed, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        // The failed project is present as an error payload, not missing.
        let lines = PayloadStore::read_lines(&path).unwrap();
        assert_eq!(lines.len(), 3);
        let payloads: Vec<ProjectPayload> = lines
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let failed = payloads
            .iter()
            .find(|p| p.project_id == "proj-bad")
            .unwrap();
        assert!(failed.error.as_deref().unwrap().contains("denied"));
        assert!(failed.insights.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
