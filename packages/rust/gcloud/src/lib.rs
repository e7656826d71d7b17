//! External interfaces for svcaudit: the recommendation source, the
//! telemetry source, and the liveness probe, plus the retry wrapper
//! applied around each call.
//!
//! Each interface is a trait so the pipeline stages can be exercised
//! against in-process fakes; the `Gcloud*`/`MonitoringApi` impls talk
//! to the real services. Trait methods return `impl Future + Send` so
//! generic stage workers can be spawned onto the runtime.

pub mod iam;
pub mod monitoring;
pub mod recommender;
pub mod retry;

mod exec;

use std::future::Future;

use serde_json::Value;

use svcaudit_shared::Result;

/// Per-project source of account-level inactivity recommendations.
pub trait RecommendationSource: Send + Sync {
    /// List raw insight objects for one project. Idempotent read; the
    /// impl performs any enable-API precondition itself.
    fn list_recommendations(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;
}

/// Per-account source of authentication telemetry.
pub trait TelemetrySource: Send + Sync {
    /// Whether any authentication event exists for the account's stable
    /// internal identifier within the configured trailing window.
    fn recent_activity(
        &self,
        project_id: &str,
        unique_id: &str,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// Per-account liveness (enablement) probe.
pub trait LivenessProbe: Send + Sync {
    /// The account's `disabled` flag: `true` means disabled.
    fn probe(&self, project_id: &str, email: &str) -> impl Future<Output = Result<bool>> + Send;
}

pub use iam::GcloudIam;
pub use monitoring::MonitoringApi;
pub use recommender::GcloudRecommender;
pub use retry::with_backoff;
