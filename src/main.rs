//! Issue lifecycle CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;

use issue_lifecycle::cli::commands::{once, reconcile, run, status};
use issue_lifecycle::cli::{Cli, Commands};
use issue_lifecycle::infrastructure::logging::LoggerImpl;
use issue_lifecycle::{Config, ConfigLoader};

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    if cli.dry_run {
        config.worker.dry_run = true;
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let config = match load_config(&cli).context("Failed to load configuration") {
        Ok(config) => config,
        Err(err) => issue_lifecycle::cli::handle_error(err, json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => issue_lifecycle::cli::handle_error(err, json),
    };

    let result = match cli.command {
        Commands::Run(args) => run::execute(args, config, json).await,
        Commands::Once { skip_bootstrap } => once::execute(config, skip_bootstrap, json).await,
        Commands::Reconcile(args) => reconcile::execute(args, config, json).await,
        Commands::Status(args) => status::execute(args, config, json).await,
    };

    if let Err(err) = result {
        issue_lifecycle::cli::handle_error(err, json);
    }
}
