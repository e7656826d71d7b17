//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use svcaudit_core::notify;
use svcaudit_core::pipeline::{AuditConfig, AuditResult, ProgressReporter, Sources, run_audit};
use svcaudit_gcloud::{GcloudIam, GcloudRecommender, MonitoringApi};
use svcaudit_shared::{AppConfig, PipelineConfig, init_config, load_config, webhook_url};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// svcaudit — find unused Google Cloud service accounts.
#[derive(Parser)]
#[command(
    name = "svcaudit",
    version,
    about = "Audit Google Cloud service accounts for inactivity and produce a CSV report.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full audit over a project list.
    Run {
        /// File listing project identifiers, one per line.
        projects: PathBuf,

        /// Output root for run artifacts (defaults to config output_dir).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Skip the Slack notification even if a webhook is configured.
        #[arg(long)]
        no_notify: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "svcaudit=info",
        1 => "svcaudit=debug",
        _ => "svcaudit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            projects,
            out,
            no_notify,
        } => cmd_run(projects, out, no_notify).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(projects: PathBuf, out: Option<PathBuf>, no_notify: bool) -> Result<()> {
    let config = load_config()?;
    let pipeline = PipelineConfig::from(&config);

    let output_root = match out {
        Some(p) => p,
        None => expand_tilde(&config.defaults.output_dir)?,
    };

    let audit_config = AuditConfig {
        projects_path: projects,
        output_root,
        pipeline: pipeline.clone(),
    };

    let sources = Sources {
        recommendations: Arc::new(GcloudRecommender::new(pipeline.collector_timeout)),
        telemetry: Arc::new(MonitoringApi::new(
            pipeline.telemetry_window_days,
            pipeline.telemetry_timeout,
        )?),
        liveness: Arc::new(GcloudIam::new(pipeline.liveness_timeout)),
    };

    info!(
        projects = %audit_config.projects_path.display(),
        out = %audit_config.output_root.display(),
        "starting audit"
    );

    let reporter = CliProgress::new();
    let result = run_audit(&audit_config, sources, &reporter).await?;

    println!();
    println!("  Audit complete!");
    println!("  Run ID:   {}", result.run_id);
    println!("  Projects: {}", result.projects);
    println!("  Accounts: {}", result.records);
    println!("  Flagged:  {}", result.flagged);
    println!("  Report:   {}", result.report_path.display());
    println!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    println!();

    if no_notify {
        return Ok(());
    }

    match webhook_url(&config) {
        Some(url) => {
            let client = reqwest::Client::new();
            notify::send_report(&client, &url, &result).await;
        }
        None => {
            info!(
                env_var = %config.notify.webhook_url_env,
                "webhook env var not set, skipping notification"
            );
        }
    }

    Ok(())
}

/// Expand a leading `~/` against the user's home directory.
fn expand_tilde(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| eyre!("could not determine home directory"))?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(path))
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn task_progress(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {detail}"));
    }

    fn done(&self, _result: &AuditResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
