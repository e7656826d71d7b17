//! Capped exponential backoff for external calls.
//!
//! Every external call is attempted up to `max_attempts` times; the
//! final error is returned to the call site, where the per-record
//! contract turns it into an `Error: ...` field value rather than a
//! failed run.

use std::time::Duration;

use tracing::warn;

use svcaudit_shared::RetryConfig;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max_delay_ms`.
pub fn backoff_delay(policy: &RetryConfig, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(10);
    let ms = policy.base_delay_ms.saturating_mul(1u64 << shift);
    Duration::from_millis(ms.min(policy.max_delay_ms))
}

/// Run `op`, retrying on failure with capped exponential backoff.
/// `label` names the call site in retry logs.
pub async fn with_backoff<T, E, F, Fut>(
    policy: &RetryConfig,
    label: &str,
    mut op: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                let delay = backoff_delay(policy, attempt);
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "external call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 4,
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        };
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(&policy, 60), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_backoff(&fast_policy(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(format!("transient failure {n}"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_backoff(&fast_policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("still down".to_string()) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "still down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_attempt_means_no_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_backoff(&fast_policy(1), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
