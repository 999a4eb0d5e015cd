//! `once`: a single reconciliation cycle.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::cli::output::output;
use crate::cli::runtime::Runtime;
use crate::domain::models::Config;

use super::CycleOutput;

pub async fn execute(config: Config, skip_bootstrap: bool, json_mode: bool) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    if !skip_bootstrap {
        runtime
            .reconciler
            .bootstrap()
            .await
            .context("Failed to create missing labels and milestones")?;
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let report = runtime
        .pool
        .run_cycle(&cancel)
        .await
        .context("Failed to list issues")?;
    output(&CycleOutput::from(report), json_mode);
    Ok(())
}
