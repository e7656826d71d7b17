//! Bounded external-command execution shared by the gcloud-backed
//! interfaces.

use std::process::Output;
use std::time::Duration;

use tokio::process::Command;

use svcaudit_shared::{AuditError, Result};

/// Run a command with a hard deadline. Spawn failures and timeouts both
/// become `Command` errors carrying the call-site label.
pub(crate) async fn run_with_timeout(
    cmd: &mut Command,
    timeout: Duration,
    label: &str,
) -> Result<Output> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(AuditError::Command(format!("{label}: failed to run: {e}"))),
        Err(_) => Err(AuditError::Command(format!(
            "{label}: timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

/// Map a non-zero exit into a `Command` error carrying trimmed stderr.
pub(crate) fn require_success(output: &Output, label: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(AuditError::Command(format!(
        "{label}: {} ({})",
        stderr.trim(),
        output.status
    )))
}
