//! Operator channel for issues that keep failing.

use crate::domain::models::IssueNumber;

/// Receives alerts that need human attention.
pub trait OperatorChannel: Send + Sync {
    fn issue_failed(&self, issue: IssueNumber, attempts: u32, reason: &str);
}

/// Operator channel that logs at error level on the `operator` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOperatorChannel;

impl OperatorChannel for LogOperatorChannel {
    fn issue_failed(&self, issue: IssueNumber, attempts: u32, reason: &str) {
        tracing::error!(
            target: "operator",
            issue,
            attempts,
            reason,
            "issue reconciliation exhausted its retries"
        );
    }
}
