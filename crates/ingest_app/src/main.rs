use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ingest_app::commands;
use ingest_app::config::AppConfig;
use ingest_logging::{ingest_error, parse_level};

/// Pulls NYC Open Data resources into a local dataset and reports each run to
/// a Telegram chat.
#[derive(Debug, Parser)]
#[command(name = "open-data-ingest", version)]
struct Cli {
    /// RON configuration file. Defaults apply when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// error, warn, info, debug or trace.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write the log to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract every resource and load it into the dataset.
    Run,
    /// Report missing or invalid configuration without running anything.
    Check,
    /// Send a test message to the configured chat.
    NotifyTest {
        #[arg(long, default_value = "Notification channel test.")]
        message: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    ingest_app::logging::initialize(parse_level(&cli.log_level), cli.log_file.as_deref());
    let _ = dotenvy::dotenv();

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ingest_error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_env(|name| std::env::var(name).ok());

    match &cli.command {
        Command::Run => commands::run(&config).map(|_| ()),
        Command::Check => commands::check(&config),
        Command::NotifyTest { message } => commands::notify_test(&config, message),
    }
}
