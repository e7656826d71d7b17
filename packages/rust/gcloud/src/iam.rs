//! Liveness probe backed by `gcloud iam service-accounts describe`.

use std::future::Future;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use svcaudit_shared::Result;

use crate::LivenessProbe;
use crate::exec::{require_success, run_with_timeout};

/// Probes an account's `disabled` flag via the gcloud CLI.
pub struct GcloudIam {
    timeout: Duration,
}

impl GcloudIam {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn describe(&self, project_id: &str, email: &str) -> Result<bool> {
        let mut cmd = Command::new("gcloud");
        cmd.args(["iam", "service-accounts", "describe", email])
            .args(["--project", project_id])
            .args(["--format", "value(disabled)"]);

        let output = run_with_timeout(&mut cmd, self.timeout, "describe").await?;
        require_success(&output, "describe")?;

        let disabled = parse_disabled(&output.stdout);
        debug!(project_id, email, disabled, "liveness probe done");
        Ok(disabled)
    }
}

impl LivenessProbe for GcloudIam {
    fn probe(&self, project_id: &str, email: &str) -> impl Future<Output = Result<bool>> + Send {
        self.describe(project_id, email)
    }
}

/// `value(disabled)` prints "True" for a disabled account; anything
/// else (including an empty line for accounts without the field) means
/// enabled.
fn parse_disabled(stdout: &[u8]) -> bool {
    String::from_utf8_lossy(stdout)
        .trim()
        .eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_true_variants() {
        assert!(parse_disabled(b"True\n"));
        assert!(parse_disabled(b"true"));
    }

    #[test]
    fn enabled_variants() {
        assert!(!parse_disabled(b"False\n"));
        // Accounts created before the flag existed print nothing.
        assert!(!parse_disabled(b""));
        assert!(!parse_disabled(b"\n"));
    }
}
