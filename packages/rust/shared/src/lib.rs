//! Shared types, error model, and configuration for svcaudit.
//!
//! This crate is the foundation depended on by all other svcaudit crates.
//! It provides:
//! - [`AuditError`] — the unified error type
//! - Domain types ([`AccountRecord`], [`ProjectPayload`], [`RunId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, NotifyConfig, PipelineConfig, RetryConfig, TimeoutsConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, read_project_list,
    webhook_url,
};
pub use error::{AuditError, Result};
pub use types::{
    AccountRecord, ActivitySignal, DISPLAY_TIME_FORMAT, INACTIVITY_MARKER, InactivityFlag,
    LivenessState, ProjectPayload, REPORT_COLUMNS, RunId, SOURCE_TIME_FORMAT,
    SYSTEM_MANAGED_SUFFIX, normalize_timestamp,
};
