//! `reconcile <issue>`: one pass over one issue.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::cli::runtime::Runtime;
use crate::domain::models::{Config, IssueNumber, ReconcileOutcome};

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Issue number
    pub issue: IssueNumber,
}

#[derive(Debug, Serialize)]
pub struct ReconcileOutput {
    pub issue: IssueNumber,
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
}

impl CommandOutput for ReconcileOutput {
    fn to_human(&self) -> String {
        match &self.outcome {
            ReconcileOutcome::Synced(summary) => {
                let mut lines = vec![format!(
                    "Issue #{} synced: {} change(s), {} ignored command(s){}",
                    self.issue,
                    summary.changes.len(),
                    summary.rejected.len(),
                    if summary.dry_run { " (dry run)" } else { "" }
                )];
                if summary.adopted {
                    lines.push("  adopted existing bot history".to_string());
                }
                if summary.deduplicated {
                    lines.push("  paper trail was already posted".to_string());
                }
                lines.extend(summary.rejected.iter().map(|r| format!("  ignored: {r}")));
                lines.join("\n")
            }
            ReconcileOutcome::Failed { reason, .. } => format!("Issue #{} failed: {reason}", self.issue),
            ReconcileOutcome::Cancelled => format!("Issue #{} cancelled", self.issue),
        }
    }
}

pub async fn execute(args: ReconcileArgs, config: Config, json_mode: bool) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let outcome = runtime.reconciler.reconcile(args.issue).await;
    let failed = !outcome.is_synced();

    output(
        &ReconcileOutput {
            issue: args.issue,
            outcome,
        },
        json_mode,
    );
    if failed {
        bail!("issue #{} was not reconciled", args.issue);
    }
    Ok(())
}
