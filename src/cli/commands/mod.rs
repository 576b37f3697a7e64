//! CLI parser and dispatch.

mod check;
mod config_cmd;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "nsis")]
#[command(about = "Look up NSIS practice status for every code in a workbook")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    check: CheckArgs,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Look up every code in a workbook and write the results back (default)
    Check(CheckArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Clone, Default)]
pub(crate) struct CheckArgs {
    /// Workbook to process (.xlsx/.xlsm); asked for interactively when omitted
    file: Option<PathBuf>,

    /// Answer lookups locally instead of driving a browser
    #[arg(long)]
    simulate: bool,

    /// Run Chromium without a window
    #[arg(long)]
    headless: bool,

    /// Print the result records as JSON on stdout when the run ends
    #[arg(long)]
    json: bool,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())
        .await
        .context("loading configuration")?;

    match cli.command {
        Some(Commands::Check(args)) => check::cmd_check(config, args).await,
        Some(Commands::Config) => config_cmd::cmd_config_show(&config),
        None => check::cmd_check(config, cli.check).await,
    }
}
