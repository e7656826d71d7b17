//! Durable run artifacts for svcaudit: the append-only payload store,
//! the CSV result sink, and per-run directory management.
//!
//! **Access rules:**
//! - [`PayloadStore`]: many concurrent appenders, whole-line atomic appends
//! - [`CsvSink`]: a single writer task owns the file; workers append
//!   through cheap [`SinkHandle`] clones and rows are serialized by the
//!   channel, so two workers can never interleave within one row

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use svcaudit_shared::{AuditError, ProjectPayload, Result, RunId};

/// File name of the stage-1 intermediate payload store.
const PAYLOADS_FILE: &str = "payloads.jsonl";

/// File name of the stage-3 intermediate dataset.
const ENRICHED_FILE: &str = "enriched.csv";

/// File name of the final report.
const REPORT_FILE: &str = "report.csv";

/// Buffered rows in flight between workers and the sink writer.
const SINK_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// RunArtifacts
// ---------------------------------------------------------------------------

/// Per-run artifact directory layout under the configured output root.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    /// The run's own directory: `<root>/<run_id>/`.
    pub dir: PathBuf,
    /// Stage-1 intermediate: raw recommendation payloads.
    pub payloads_path: PathBuf,
    /// Stage-3 intermediate: records with the activity column.
    pub enriched_path: PathBuf,
    /// Final report with all seven columns.
    pub report_path: PathBuf,
}

impl RunArtifacts {
    /// Create the run directory and compute artifact paths.
    pub fn prepare(root: &Path, run_id: &RunId) -> Result<Self> {
        let dir = root.join(run_id.to_string());
        std::fs::create_dir_all(&dir).map_err(|e| AuditError::io(&dir, e))?;

        Ok(Self {
            payloads_path: dir.join(PAYLOADS_FILE),
            enriched_path: dir.join(ENRICHED_FILE),
            report_path: dir.join(REPORT_FILE),
            dir,
        })
    }

    /// Delete artifacts left by previous runs (fresh-state precondition).
    /// A missing root is fine; individual removal failures are logged
    /// and skipped, never fatal.
    pub fn clean_previous(root: &Path) -> Result<()> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AuditError::io(root, e)),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => debug!(?path, "removed previous run artifact"),
                Err(e) => warn!(?path, error = %e, "failed to remove previous run artifact"),
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PayloadStore
// ---------------------------------------------------------------------------

/// Append-only JSON-lines store for raw recommendation payloads.
///
/// Each append writes exactly one serialized payload plus a newline
/// under the lock, so concurrent collector tasks can never interleave
/// partial blocks. The read side is independent of any live store
/// handle — the transformer re-reads the file from disk.
pub struct PayloadStore {
    file: Mutex<std::fs::File>,
    path: PathBuf,
}

impl PayloadStore {
    /// Create (truncating) the store at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AuditError::io(parent, e))?;
        }
        let file = std::fs::File::create(path).map_err(|e| AuditError::io(path, e))?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Append one payload as a single atomic line.
    pub async fn append(&self, payload: &ProjectPayload) -> Result<()> {
        let line = serde_json::to_string(payload)
            .map_err(|e| AuditError::Sink(format!("payload serialization failed: {e}")))?;

        let mut file = self.file.lock().await;
        writeln!(file, "{line}").map_err(|e| AuditError::io(&self.path, e))?;
        file.flush().map_err(|e| AuditError::io(&self.path, e))?;
        Ok(())
    }

    /// Read all payload lines back from disk, skipping blanks.
    /// Parsing is left to the transformer so one malformed block can be
    /// skipped without losing its neighbors.
    pub fn read_lines(path: &Path) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(path).map_err(|e| AuditError::io(path, e))?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(String::from)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// CsvSink
// ---------------------------------------------------------------------------

/// Shared handle workers use to append finished rows.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<Vec<String>>,
}

impl SinkHandle {
    /// Append one complete row. Rows from concurrent callers are
    /// serialized by the channel; a row is written whole or not at all.
    pub async fn append(&self, row: Vec<String>) -> Result<()> {
        self.tx
            .send(row)
            .await
            .map_err(|_| AuditError::Sink("sink writer task is gone".into()))
    }
}

/// The shared, append-only destination for finalized records.
///
/// A single writer task owns the `csv::Writer`; workers never touch the
/// file. The header is written eagerly at creation, each row is flushed
/// as it arrives so output survives a later crash, and rows are never
/// reordered relative to channel arrival.
pub struct CsvSink {
    tx: mpsc::Sender<Vec<String>>,
    writer: JoinHandle<Result<usize>>,
    path: PathBuf,
}

impl CsvSink {
    /// Create the sink file, write the header, and spawn the writer task.
    /// Creation failure is fatal to the caller — it happens before any
    /// worker is spawned.
    pub fn create(path: &Path, header: &[&str]) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AuditError::io(parent, e))?;
        }

        let mut csv_writer = csv::Writer::from_path(path)
            .map_err(|e| AuditError::Sink(format!("cannot create {}: {e}", path.display())))?;
        csv_writer
            .write_record(header)
            .and_then(|()| csv_writer.flush().map_err(csv::Error::from))
            .map_err(|e| AuditError::Sink(format!("header write failed: {e}")))?;

        let (tx, mut rx) = mpsc::channel::<Vec<String>>(SINK_CHANNEL_CAPACITY);
        let writer_path = path.to_path_buf();

        let writer = tokio::spawn(async move {
            let mut rows_written = 0usize;
            while let Some(row) = rx.recv().await {
                csv_writer.write_record(&row).map_err(|e| {
                    AuditError::Sink(format!("row write failed at {}: {e}", writer_path.display()))
                })?;
                // Flush per row: each appended record is durable immediately.
                csv_writer.flush().map_err(|e| AuditError::io(&writer_path, e))?;
                rows_written += 1;
            }
            debug!(path = %writer_path.display(), rows = rows_written, "sink writer drained");
            Ok(rows_written)
        });

        Ok(Self {
            tx,
            writer,
            path: path.to_path_buf(),
        })
    }

    /// Get a cheap handle for worker appends.
    pub fn handle(&self) -> SinkHandle {
        SinkHandle {
            tx: self.tx.clone(),
        }
    }

    /// Close the sink: drop the send side, wait for the writer to drain
    /// every queued row, and return the number of rows written.
    ///
    /// Every outstanding [`SinkHandle`] must be dropped before calling
    /// this, or the writer never observes a closed channel and `finish`
    /// waits forever. The stage functions take their handle by value
    /// and drop it on return, so they satisfy this on their own.
    pub async fn finish(self) -> Result<usize> {
        drop(self.tx);
        let rows = self
            .writer
            .await
            .map_err(|e| AuditError::Sink(format!("sink writer panicked: {e}")))??;
        info!(path = %self.path.display(), rows, "sink closed");
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Report reading
// ---------------------------------------------------------------------------

/// Count report rows whose inactivity column reads "Yes".
/// Returns 0 when the report cannot be read — the final summary always
/// states a count.
pub fn count_flagged(path: &Path) -> usize {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read report for flag count");
            return 0;
        }
    };

    reader
        .records()
        .filter_map(|r| r.ok())
        .filter(|row| row.get(3) == Some("Yes"))
        .count()
}
