//! Application configuration for svcaudit.
//!
//! User config lives at `~/.svcaudit/svcaudit.toml`.
//! CLI flags override config file values, which override defaults.
//! The webhook secret itself is never stored in config — only the name
//! of the environment variable holding it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "svcaudit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".svcaudit";

// ---------------------------------------------------------------------------
// Config structs (matching svcaudit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// External-call timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Retry/backoff policy for external calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Notification settings.
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for per-run artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Bounded worker count for the telemetry enrichment stage.
    #[serde(default = "default_enricher_workers")]
    pub enricher_workers: usize,

    /// Fixed worker-pool size for the liveness checker stage.
    #[serde(default = "default_checker_workers")]
    pub checker_workers: usize,

    /// Trailing window, in days, for the telemetry query.
    #[serde(default = "default_telemetry_window_days")]
    pub telemetry_window_days: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            enricher_workers: default_enricher_workers(),
            checker_workers: default_checker_workers(),
            telemetry_window_days: default_telemetry_window_days(),
        }
    }
}

fn default_output_dir() -> String {
    "~/svcaudit-runs".into()
}
fn default_enricher_workers() -> usize {
    8
}
fn default_checker_workers() -> usize {
    2
}
fn default_telemetry_window_days() -> u32 {
    90
}

/// `[timeouts]` section. Every external call is bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Per-account liveness describe call.
    #[serde(default = "default_liveness_secs")]
    pub liveness_secs: u64,

    /// Per-project recommendation listing.
    #[serde(default = "default_collector_secs")]
    pub collector_secs: u64,

    /// Per-account telemetry query.
    #[serde(default = "default_telemetry_secs")]
    pub telemetry_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            liveness_secs: default_liveness_secs(),
            collector_secs: default_collector_secs(),
            telemetry_secs: default_telemetry_secs(),
        }
    }
}

fn default_liveness_secs() -> u64 {
    10
}
fn default_collector_secs() -> u64 {
    60
}
fn default_telemetry_secs() -> u64 {
    30
}

/// `[retry]` section — capped exponential backoff for external calls.
/// Exhausted retries still degrade to per-record `Error: ...` values,
/// never to a failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call (1 = no retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}

/// `[notify]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Name of the env var holding the webhook URL (never the URL itself).
    #[serde(default = "default_webhook_url_env")]
    pub webhook_url_env: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url_env: default_webhook_url_env(),
        }
    }
}

fn default_webhook_url_env() -> String {
    "SLACK_WEBHOOK_URL".into()
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration handed to each stage at construction.
/// No process-wide singletons: everything a stage needs arrives here.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded worker count for the enrichment stage.
    pub enricher_workers: usize,
    /// Fixed worker-pool size for the checker stage.
    pub checker_workers: usize,
    /// Trailing telemetry window in days.
    pub telemetry_window_days: u32,
    /// Liveness describe-call timeout.
    pub liveness_timeout: Duration,
    /// Recommendation listing timeout.
    pub collector_timeout: Duration,
    /// Telemetry query timeout.
    pub telemetry_timeout: Duration,
    /// Retry policy applied around every external call.
    pub retry: RetryConfig,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            enricher_workers: config.defaults.enricher_workers.max(1),
            checker_workers: config.defaults.checker_workers.max(1),
            telemetry_window_days: config.defaults.telemetry_window_days,
            liveness_timeout: Duration::from_secs(config.timeouts.liveness_secs),
            collector_timeout: Duration::from_secs(config.timeouts.collector_secs),
            telemetry_timeout: Duration::from_secs(config.timeouts.telemetry_secs),
            retry: config.retry.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.svcaudit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AuditError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.svcaudit/svcaudit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AuditError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AuditError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AuditError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AuditError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AuditError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the webhook URL from the configured env var.
/// `None` means notification is simply skipped for the run.
pub fn webhook_url(config: &AppConfig) -> Option<String> {
    match std::env::var(&config.notify.webhook_url_env) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Run input
// ---------------------------------------------------------------------------

/// Read the project list: one project identifier per line, blank lines
/// ignored. A missing file or an empty list is fatal for the run —
/// nothing is spawned and no artifact is touched.
pub fn read_project_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| AuditError::io(path, e))?;

    let projects: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();

    if projects.is_empty() {
        return Err(AuditError::validation(format!(
            "no projects listed in {}",
            path.display()
        )));
    }

    Ok(projects)
}
