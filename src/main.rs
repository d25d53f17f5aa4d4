//! Grist - incremental parser builder
//!
//! CLI entry point.

use clap::Parser;
use console::style;
use grist::cli::Cli;
use grist::config::ConfigManager;
use grist::error::GristResult;
use std::process::ExitCode;
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

async fn run() -> GristResult<()> {
    let cli = Cli::parse();

    // Load configuration first: it selects the log format
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("grist=warn"),
        1 => EnvFilter::new("grist=info"),
        _ => EnvFilter::new("grist=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    grist::cli::build::execute(&cli, &config).await
}
