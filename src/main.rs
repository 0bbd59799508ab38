//! cachepack - offline npm cache builder
//!
//! CLI entry point that dispatches to subcommands.

use cachepack::cli::{Cli, Commands};
use cachepack::config::ConfigManager;
use cachepack::error::CachepackResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CachepackResult<()> {
    let cli = Cli::parse();

    // Completions need neither logging nor config
    if let Commands::Completions { shell } = cli.command {
        cachepack::cli::commands::completions(shell);
        return Ok(());
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, config.general.verbose, &config.general.log_format);
    debug!("Loaded config from {}", config_manager.path().display());

    ConfigManager::ensure_state_dirs().await?;
    cachepack::ui::init_theme();

    match cli.command {
        Commands::Install(args) => cachepack::cli::commands::install(args, &config).await,
        Commands::Config(args) => {
            cachepack::cli::commands::config(args, &config, &config_manager).await
        }
        Commands::Completions { .. } => Ok(()),
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug. `RUST_LOG` wins when set.
fn init_logging(verbose: u8, config_verbose: bool, format: &str) {
    let level = match verbose {
        0 if config_verbose => "info",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cachepack={}", level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
