//! `run`: poll the tracker until interrupted.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cli::output::{output, CommandOutput};
use crate::cli::runtime::Runtime;
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Seconds between cycles; overrides worker.poll_interval_secs
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Do not create missing labels and milestones at start-up
    #[arg(long)]
    pub skip_bootstrap: bool,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub cycles: u64,
    pub failed_cycles: u64,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        format!(
            "Stopped after {} cycle(s), {} of which could not list issues",
            self.cycles, self.failed_cycles
        )
    }
}

pub async fn execute(args: RunArgs, config: Config, json_mode: bool) -> Result<()> {
    let interval = Duration::from_secs(args.interval.unwrap_or(config.worker.poll_interval_secs).max(1));
    let runtime = Runtime::build(config).await?;
    if !args.skip_bootstrap {
        runtime
            .reconciler
            .bootstrap()
            .await
            .context("Failed to create missing labels and milestones")?;
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing in-flight writes");
            shutdown.cancel();
        }
    });

    let mut summary = RunOutput {
        cycles: 0,
        failed_cycles: 0,
    };

    info!(interval_secs = interval.as_secs(), "polling started");
    while !cancel.is_cancelled() {
        summary.cycles += 1;
        if let Err(err) = runtime.pool.run_cycle(&cancel).await {
            // Listing failed; every issue is retried next cycle
            summary.failed_cycles += 1;
            error!(error = %err, cycle = summary.cycles, "reconciliation cycle failed");
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    output(&summary, json_mode);
    Ok(())
}
