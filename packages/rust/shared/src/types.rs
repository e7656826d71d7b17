//! Core domain types for svcaudit audit runs.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AuditError, Result};

/// Email suffix identifying platform-provisioned service accounts.
/// Accounts matching this never receive a liveness probe.
pub const SYSTEM_MANAGED_SUFFIX: &str = "appspot.gserviceaccount.com";

/// Marker text in a recommendation description that flags inactivity.
pub const INACTIVITY_MARKER: &str = "was inactive.";

/// Timestamp format emitted by the recommendation source.
pub const SOURCE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Canonical display format for `last_authenticated_at`.
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column headers for the final report, in row order.
pub const REPORT_COLUMNS: [&str; 7] = [
    "Project ID",
    "Service Account Email",
    "Service Account ID",
    "Alert (Inactive)",
    "Last Authenticated Time",
    "Recent Activity",
    "Current State",
];

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for audit run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Column enums
// ---------------------------------------------------------------------------

/// Whether the recommendation source flagged the account as inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InactivityFlag {
    Yes,
    No,
}

impl InactivityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No",
        }
    }
}

/// Outcome of the telemetry query for an account (stage 3 column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivitySignal {
    /// At least one authentication event in the trailing window.
    Yes,
    /// Query succeeded with zero time-series points.
    No,
    /// The query itself failed; carries the failure description.
    Error(String),
}

impl std::fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "Yes"),
            Self::No => write!(f, "No"),
            Self::Error(detail) => write!(f, "Error: {detail}"),
        }
    }
}

/// Enablement state of an account (stage 4 column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LivenessState {
    Active,
    Disabled,
    /// Platform-provisioned account; classified without an external call.
    SystemManaged,
    /// The probe failed; carries the failure description.
    Error(String),
}

impl std::fmt::Display for LivenessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Disabled => write!(f, "Disabled"),
            Self::SystemManaged => write!(f, "System Managed"),
            Self::Error(detail) => write!(f, "Error: {detail}"),
        }
    }
}

// ---------------------------------------------------------------------------
// AccountRecord
// ---------------------------------------------------------------------------

/// One service account's audit row as it flows through the pipeline.
///
/// `(project_id, account_email)` is immutable once the record exists
/// after the transformer stage. The enricher and checker stages only
/// fill the two `Option` columns, in that order; a record is final
/// only when both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub project_id: String,
    pub account_email: String,
    pub account_id: Option<String>,
    pub inactivity_flag: InactivityFlag,
    /// Canonical display timestamp, or "N/A" when absent/unparseable.
    pub last_authenticated_at: String,
    /// Filled by the enricher (stage 3).
    pub recent_activity: Option<ActivitySignal>,
    /// Filled by the checker (stage 4).
    pub liveness_state: Option<LivenessState>,
}

impl AccountRecord {
    /// Whether both derived columns have been filled in.
    pub fn is_complete(&self) -> bool {
        self.recent_activity.is_some() && self.liveness_state.is_some()
    }

    /// Whether the account email marks it as platform-managed.
    pub fn is_system_managed(&self) -> bool {
        self.account_email.ends_with(SYSTEM_MANAGED_SUFFIX)
    }

    /// Render the final report row in fixed column order.
    ///
    /// Errors if either derived column is missing — a partial record
    /// must never reach the report.
    pub fn to_row(&self) -> Result<Vec<String>> {
        let activity = self.recent_activity.as_ref().ok_or_else(|| {
            AuditError::validation(format!(
                "record {} missing recent-activity column",
                self.account_email
            ))
        })?;
        let state = self.liveness_state.as_ref().ok_or_else(|| {
            AuditError::validation(format!(
                "record {} missing liveness column",
                self.account_email
            ))
        })?;

        Ok(vec![
            self.project_id.clone(),
            self.account_email.clone(),
            self.account_id.clone().unwrap_or_default(),
            self.inactivity_flag.as_str().to_string(),
            self.last_authenticated_at.clone(),
            activity.to_string(),
            state.to_string(),
        ])
    }

    /// Render the enriched intermediate row (first six columns).
    pub fn to_enriched_row(&self) -> Result<Vec<String>> {
        let activity = self.recent_activity.as_ref().ok_or_else(|| {
            AuditError::validation(format!(
                "record {} missing recent-activity column",
                self.account_email
            ))
        })?;

        Ok(vec![
            self.project_id.clone(),
            self.account_email.clone(),
            self.account_id.clone().unwrap_or_default(),
            self.inactivity_flag.as_str().to_string(),
            self.last_authenticated_at.clone(),
            activity.to_string(),
        ])
    }
}

/// Normalize a source timestamp into the canonical display format.
/// Anything that does not match the source pattern becomes "N/A".
pub fn normalize_timestamp(raw: Option<&str>) -> String {
    match raw {
        Some(s) => match NaiveDateTime::parse_from_str(s, SOURCE_TIME_FORMAT) {
            Ok(dt) => dt.format(DISPLAY_TIME_FORMAT).to_string(),
            Err(_) => "N/A".to_string(),
        },
        None => "N/A".to_string(),
    }
}

// ---------------------------------------------------------------------------
// ProjectPayload
// ---------------------------------------------------------------------------

/// One project's raw recommendation payload, as stored in the
/// intermediate payload store. Exactly one of `insights`/`error` is
/// meaningful: a failed collection stores the error text instead of
/// aborting sibling projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPayload {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProjectPayload {
    /// A successful collection result.
    pub fn ok(project_id: impl Into<String>, insights: Vec<Value>) -> Self {
        Self {
            project_id: project_id.into(),
            insights: Some(insights),
            error: None,
        }
    }

    /// A failed collection result, with the error captured as data.
    pub fn failed(project_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            insights: None,
            error: Some(error.into()),
        }
    }
}
