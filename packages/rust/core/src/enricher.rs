//! Stage 3: telemetry enrichment.
//!
//! One task per record, bounded by a semaphore sized from
//! configuration — enriching ten thousand accounts must not mean ten
//! thousand simultaneous queries. Each task turns the telemetry answer
//! into the `recent_activity` column (query failure becomes an
//! `Error: ...` value), appends the enriched row to the stage sink,
//! and bumps the shared progress counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::{info, instrument};

use svcaudit_gcloud::{TelemetrySource, with_backoff};
use svcaudit_shared::{AccountRecord, ActivitySignal, AuditError, PipelineConfig, Result};
use svcaudit_sink::SinkHandle;

use crate::pipeline::ProgressReporter;

/// Enrich every record with its recent-activity signal.
///
/// Completion order is arbitrary; the returned vector is the stage's
/// materialized output for the checker. A sink failure or task panic is
/// fatal — it would silently drop a record otherwise.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn enrich<T>(
    records: Vec<AccountRecord>,
    telemetry: Arc<T>,
    sink: SinkHandle,
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
) -> Result<Vec<AccountRecord>>
where
    T: TelemetrySource + 'static,
{
    let total = records.len();
    let semaphore = Arc::new(Semaphore::new(config.enricher_workers));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(total);

    for mut record in records {
        let telemetry = telemetry.clone();
        let semaphore = semaphore.clone();
        let sink = sink.clone();
        let retry = config.retry.clone();
        let completed = completed.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");

            let unique_id = record.account_id.clone().unwrap_or_default();
            let answer = with_backoff(&retry, "telemetry query", || {
                telemetry.recent_activity(&record.project_id, &unique_id)
            })
            .await;

            record.recent_activity = Some(match answer {
                Ok(true) => ActivitySignal::Yes,
                Ok(false) => ActivitySignal::No,
                Err(e) => ActivitySignal::Error(e.to_string()),
            });

            let row = record.to_enriched_row()?;
            sink.append(row).await?;
            completed.fetch_add(1, Ordering::SeqCst);

            Ok::<AccountRecord, AuditError>(record)
        }));
    }

    let mut enriched = Vec::with_capacity(total);
    for handle in handles {
        let record = handle
            .await
            .map_err(|e| AuditError::Sink(format!("enricher task panicked: {e}")))??;
        enriched.push(record);
        progress.task_progress(completed.load(Ordering::SeqCst), total, "enriching accounts");
    }

    info!(records = enriched.len(), "enrichment complete");
    Ok(enriched)
}
