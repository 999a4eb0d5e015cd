//! CLI command implementations.

pub mod once;
pub mod reconcile;
pub mod run;
pub mod status;

use serde::Serialize;

use crate::domain::models::{CycleReport, IssueReport};

use super::output::CommandOutput;

/// Cycle report as printed by `once` and `run`.
#[derive(Debug, Serialize)]
pub struct CycleOutput {
    pub synced: usize,
    pub failed: usize,
    pub deferred: usize,
    pub cancelled: usize,
    #[serde(flatten)]
    pub report: CycleReport,
}

impl From<CycleReport> for CycleOutput {
    fn from(report: CycleReport) -> Self {
        Self {
            synced: report.synced(),
            failed: report.failed(),
            deferred: report.deferred(),
            cancelled: report.cancelled(),
            report,
        }
    }
}

impl CommandOutput for CycleOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Cycle finished: {} synced, {} failed, {} deferred, {} cancelled",
            self.synced, self.failed, self.deferred, self.cancelled
        )];
        for (issue, entry) in &self.report.issues {
            match entry {
                IssueReport::Synced { changes, rejected } if *changes > 0 || *rejected > 0 => {
                    lines.push(format!("  #{issue}: {changes} change(s), {rejected} ignored command(s)"));
                }
                IssueReport::Failed { reason, exhausted } => {
                    let note = if *exhausted { " (retries exhausted)" } else { "" };
                    lines.push(format!("  #{issue}: failed{note}: {reason}"));
                }
                _ => {}
            }
        }
        lines.join("\n")
    }
}
