mod cli;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, OutputFormat};
use config::BotfarmConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so stdout stays machine readable, or to a daily file
/// under `--log-dir`. The returned guard must outlive the program.
fn init_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let default_level = if cli.verbose {
        "debug"
    } else {
        "info,botfarm_ai=debug"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match &cli.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "botfarm.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli)?;

    let mut config = BotfarmConfig::load(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.model.id = model.clone();
    }

    match cli.command {
        Commands::Replay(args) => {
            let format = cli.format.unwrap_or(OutputFormat::Json);
            commands::replay::run(&config, args, format).await
        }
        Commands::Budget(args) => {
            commands::budget::run(&config, args, cli.format.unwrap_or(OutputFormat::Text))
        }
        Commands::Models => commands::models::run(cli.format.unwrap_or(OutputFormat::Text)),
    }
}
