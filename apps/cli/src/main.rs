//! svcaudit CLI — service account inactivity auditing for Google Cloud.
//!
//! Fans out over a project list, collects IAM inactivity insights,
//! cross-references authentication telemetry, and produces a CSV report
//! of unused service accounts.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
