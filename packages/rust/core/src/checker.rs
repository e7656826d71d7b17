//! Stage 4: liveness checking.
//!
//! A fixed pool of workers pulls records from a shared FIFO queue.
//! Platform-managed accounts take the fast path and never reach the
//! probe. Every record dispatched to the queue ends up in the sink —
//! probe failures are written as `Error: ...` state values, never
//! dropped rows — and each worker appends a row immediately after
//! classifying it, so completed work survives a later crash.
//!
//! Shutdown: all records are enqueued and the sender is dropped before
//! workers can observe a closed channel, so `recv() == None` is the
//! all-work-consumed barrier. No late producer can race an early
//! worker exit.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, instrument};

use svcaudit_gcloud::{LivenessProbe, with_backoff};
use svcaudit_shared::{AccountRecord, AuditError, LivenessState, PipelineConfig, Result};
use svcaudit_sink::SinkHandle;

use crate::pipeline::ProgressReporter;

/// Classify every record's liveness and append the final rows.
/// Returns the number of rows appended, which always equals the number
/// of records submitted.
#[instrument(skip_all, fields(records = records.len(), workers = config.checker_workers))]
pub async fn check<P>(
    records: Vec<AccountRecord>,
    probe: Arc<P>,
    sink: SinkHandle,
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
) -> Result<usize>
where
    P: LivenessProbe + 'static,
{
    let total = records.len();
    let (tx, rx) = mpsc::channel::<AccountRecord>(total.max(1));
    let rx = Arc::new(Mutex::new(rx));
    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel::<()>();

    let mut workers = Vec::with_capacity(config.checker_workers);
    for worker_id in 0..config.checker_workers {
        let rx = rx.clone();
        let probe = probe.clone();
        let sink = sink.clone();
        let retry = config.retry.clone();
        let ticks = tick_tx.clone();

        workers.push(tokio::spawn(async move {
            let mut processed = 0usize;
            loop {
                // The lock is held only while waiting to dequeue.
                let next = { rx.lock().await.recv().await };
                let Some(mut record) = next else {
                    debug!(worker_id, processed, "queue drained, worker exiting");
                    break;
                };

                let state = classify(&record, probe.as_ref(), &retry).await;
                record.liveness_state = Some(state);

                let row = record.to_row()?;
                sink.append(row).await?;
                // No listener is fine; ticks are progress, not data.
                let _ = ticks.send(());
                processed += 1;
            }
            Ok::<usize, AuditError>(processed)
        }));
    }
    drop(tick_tx);

    // Enqueue everything, then close the queue. Capacity covers the
    // whole batch, so this cannot deadlock against slow workers.
    for record in records {
        tx.send(record)
            .await
            .map_err(|_| AuditError::Sink("checker queue closed early".into()))?;
    }
    drop(tx);

    // Every worker holds a tick sender, so this drains exactly until
    // the last worker exits, one report per classified record.
    let mut completed = 0usize;
    while tick_rx.recv().await.is_some() {
        completed += 1;
        progress.task_progress(completed, total, "checking liveness");
    }

    let mut appended = 0usize;
    for worker in workers {
        appended += worker
            .await
            .map_err(|e| AuditError::Sink(format!("checker worker panicked: {e}")))??;
    }

    info!(appended, total, "liveness check complete");
    Ok(appended)
}

/// State machine per record: fast-path classification for
/// platform-managed accounts, probe mapping for everyone else.
async fn classify<P>(
    record: &AccountRecord,
    probe: &P,
    retry: &svcaudit_shared::RetryConfig,
) -> LivenessState
where
    P: LivenessProbe,
{
    if record.is_system_managed() {
        return LivenessState::SystemManaged;
    }

    let probed = with_backoff(retry, "liveness probe", || {
        probe.probe(&record.project_id, &record.account_email)
    })
    .await;

    match probed {
        Ok(true) => LivenessState::Disabled,
        Ok(false) => LivenessState::Active,
        Err(e) => LivenessState::Error(e.to_string()),
    }
}
