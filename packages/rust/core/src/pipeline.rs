//! End-to-end audit pipeline: project list → collect → transform →
//! enrich → check → report.
//!
//! Stages run strictly in order, each fully materializing its output
//! before the next begins. Per-record failures are data; the only
//! fatal errors are missing run input (raised before anything is
//! spawned or written) and sink infrastructure failures.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use svcaudit_gcloud::{LivenessProbe, RecommendationSource, TelemetrySource};
use svcaudit_shared::{PipelineConfig, REPORT_COLUMNS, Result, RunId, read_project_list};
use svcaudit_sink::{CsvSink, PayloadStore, RunArtifacts, count_flagged};

use crate::{checker, collector, enricher, transformer};

/// Configuration for one audit run.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Project list file: one project identifier per line.
    pub projects_path: PathBuf,
    /// Root directory for per-run artifacts.
    pub output_root: PathBuf,
    /// Stage tuning (worker counts, timeouts, retry policy).
    pub pipeline: PipelineConfig,
}

/// The external collaborators, injected at construction — no
/// process-wide singletons.
pub struct Sources<R, T, P> {
    pub recommendations: Arc<R>,
    pub telemetry: Arc<T>,
    pub liveness: Arc<P>,
}

/// Result of a completed audit run.
#[derive(Debug)]
pub struct AuditResult {
    /// Run identifier (names the artifact directory).
    pub run_id: RunId,
    /// Projects read from the run input.
    pub projects: usize,
    /// Normalized records that flowed through stages 3–4.
    pub records: usize,
    /// Accounts flagged inactive in the final report.
    pub flagged: usize,
    /// Path to the final report.
    pub report_path: PathBuf,
    /// Total elapsed wall-clock time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// Record-level progress within the current stage.
    fn task_progress(&self, current: usize, total: usize, detail: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &AuditResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn task_progress(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _result: &AuditResult) {}
}

/// Run the full audit.
///
/// 1. Read the project list (fatal if missing or empty)
/// 2. Fresh-state cleanup + artifact directory
/// 3. Collect recommendations per project
/// 4. Transform payloads into records
/// 5. Enrich with authentication telemetry
/// 6. Check liveness and write the final report
#[instrument(skip_all, fields(projects_path = %config.projects_path.display()))]
pub async fn run_audit<R, T, P>(
    config: &AuditConfig,
    sources: Sources<R, T, P>,
    progress: &dyn ProgressReporter,
) -> Result<AuditResult>
where
    R: RecommendationSource + 'static,
    T: TelemetrySource + 'static,
    P: LivenessProbe + 'static,
{
    let start = Instant::now();
    let run_id = RunId::new();

    // Fatal input validation comes first: an empty run never touches
    // the output root and never spawns a worker.
    let projects = read_project_list(&config.projects_path)?;
    info!(%run_id, projects = projects.len(), "starting audit run");

    progress.phase("Preparing run artifacts");
    RunArtifacts::clean_previous(&config.output_root)?;
    let artifacts = RunArtifacts::prepare(&config.output_root, &run_id)?;

    // --- Stage 1: Collect ---
    progress.phase("Collecting recommendations");
    let store = Arc::new(PayloadStore::create(&artifacts.payloads_path)?);
    let stats = collector::collect(
        &projects,
        sources.recommendations,
        store,
        &config.pipeline.retry,
    )
    .await;

    // --- Stage 2: Transform ---
    progress.phase("Normalizing recommendations");
    let lines = PayloadStore::read_lines(&artifacts.payloads_path)?;
    let records = transformer::transform(&lines);
    info!(records = records.len(), "normalization complete");

    // --- Stage 3: Enrich ---
    progress.phase("Querying authentication telemetry");
    let enriched_sink = CsvSink::create(&artifacts.enriched_path, &REPORT_COLUMNS[..6])?;
    let enriched = enricher::enrich(
        records,
        sources.telemetry,
        enriched_sink.handle(),
        &config.pipeline,
        progress,
    )
    .await?;
    enriched_sink.finish().await?;

    // --- Stage 4: Check ---
    progress.phase("Checking account liveness");
    // Sink creation failure here is fatal by design: it happens before
    // any checker worker is spawned, so no partial output is attempted.
    let report_sink = CsvSink::create(&artifacts.report_path, &REPORT_COLUMNS)?;
    let record_count = enriched.len();
    checker::check(
        enriched,
        sources.liveness,
        report_sink.handle(),
        &config.pipeline,
        progress,
    )
    .await?;
    report_sink.finish().await?;

    let flagged = count_flagged(&artifacts.report_path);

    let result = AuditResult {
        run_id,
        projects: projects.len(),
        records: record_count,
        flagged,
        report_path: artifacts.report_path,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        run_id = %result.run_id,
        projects = result.projects,
        projects_failed = stats.projects_failed,
        records = result.records,
        flagged = result.flagged,
        elapsed_ms = result.elapsed.as_millis(),
        "audit run complete"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};
    use svcaudit_shared::{AppConfig, AuditError, RetryConfig};

    struct FakeSource;

    impl RecommendationSource for FakeSource {
        fn list_recommendations(
            &self,
            project_id: &str,
        ) -> impl Future<Output = Result<Vec<Value>>> + Send {
            let project_id = project_id.to_string();
            async move {
                if project_id == "proj-down" {
                    return Err(AuditError::Command("insights list: unreachable".into()));
                }
                Ok(vec![
                    json!({
                        "description": "Service account was inactive.",
                        "content": {
                            "email": format!("stale@{project_id}.iam.gserviceaccount.com"),
                            "serviceAccountId": "111",
                            "lastAuthenticatedTime": "2024-01-01T00:00:00Z"
                        }
                    }),
                    json!({
                        "description": "healthy",
                        "content": {
                            "email": format!("app@{project_id}.appspot.gserviceaccount.com")
                        }
                    }),
                ])
            }
        }
    }

    struct FakeTelemetry;

    impl TelemetrySource for FakeTelemetry {
        fn recent_activity(
            &self,
            _project_id: &str,
            unique_id: &str,
        ) -> impl Future<Output = Result<bool>> + Send {
            let active = !unique_id.is_empty();
            async move { Ok(active) }
        }
    }

    struct FakeProbe {
        calls: AtomicUsize,
    }

    impl LivenessProbe for FakeProbe {
        fn probe(
            &self,
            _project_id: &str,
            _email: &str,
        ) -> impl Future<Output = Result<bool>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(false) }
        }
    }

    fn test_audit_config(dir: &std::path::Path, projects: &str) -> AuditConfig {
        let projects_path = dir.join("projects.txt");
        std::fs::write(&projects_path, projects).unwrap();

        let mut pipeline = PipelineConfig::from(&AppConfig::default());
        pipeline.retry = RetryConfig {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
        };

        AuditConfig {
            projects_path,
            output_root: dir.join("runs"),
            pipeline,
        }
    }

    fn fake_sources() -> (Sources<FakeSource, FakeTelemetry, FakeProbe>, Arc<FakeProbe>) {
        let probe = Arc::new(FakeProbe {
            calls: AtomicUsize::new(0),
        });
        (
            Sources {
                recommendations: Arc::new(FakeSource),
                telemetry: Arc::new(FakeTelemetry),
                liveness: probe.clone(),
            },
            probe,
        )
    }

    #[tokio::test]
    async fn full_run_accounts_for_every_record() {
        let dir = std::env::temp_dir().join(format!("svcaudit-pipeline-{}", RunId::new()));
        std::fs::create_dir_all(&dir).unwrap();

        let config = test_audit_config(&dir, "proj-a\nproj-b\nproj-down\n");
        let (sources, probe) = fake_sources();

        let result = run_audit(&config, sources, &SilentProgress).await.unwrap();

        // Two healthy projects, two insights each; the failed project
        // contributes an error payload and zero records.
        assert_eq!(result.projects, 3);
        assert_eq!(result.records, 4);
        assert_eq!(result.flagged, 2);

        // Sink rows equal transformer output: nothing dropped in 3–4.
        let mut reader = csv::Reader::from_path(&result.report_path).unwrap();
        let rows: Vec<_> = reader.records().filter_map(|r| r.ok()).collect();
        assert_eq!(rows.len(), result.records);
        assert!(rows.iter().all(|r| r.len() == REPORT_COLUMNS.len()));

        // The two appspot accounts took the fast path.
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_project_list_aborts_before_any_artifact() {
        let dir = std::env::temp_dir().join(format!("svcaudit-pipeline-empty-{}", RunId::new()));
        std::fs::create_dir_all(&dir).unwrap();

        let config = test_audit_config(&dir, "\n\n");
        let (sources, probe) = fake_sources();

        let err = run_audit(&config, sources, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Validation { .. }));

        // No worker ran and no sink was created.
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        assert!(!config.output_root.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rerun_wipes_previous_artifacts() {
        let dir = std::env::temp_dir().join(format!("svcaudit-pipeline-rerun-{}", RunId::new()));
        std::fs::create_dir_all(&dir).unwrap();

        let config = test_audit_config(&dir, "proj-a\n");

        let (sources, _) = fake_sources();
        let first = run_audit(&config, sources, &SilentProgress).await.unwrap();
        assert!(first.report_path.exists());

        let (sources, _) = fake_sources();
        let second = run_audit(&config, sources, &SilentProgress).await.unwrap();

        // The first run's directory is gone; the second's is present.
        assert!(!first.report_path.exists());
        assert!(second.report_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
