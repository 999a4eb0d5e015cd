//! Bounded worker pool running one reconciliation cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::errors::ReconcileError;
use crate::domain::models::{CycleReport, IssueNumber, IssueReport, ReconcileOutcome};
use crate::domain::ports::OperatorChannel;

use super::reconciler::Reconciler;
use super::retry_tracker::{RetryDecision, RetryTracker};

/// Runs passes over many issues with at most `max_workers` in flight.
///
/// Each issue is reconciled at most once per cycle, and issues still in
/// retry backoff are deferred.
pub struct ReconcilePool {
    reconciler: Arc<Reconciler>,
    retries: Arc<RetryTracker>,
    operator: Arc<dyn OperatorChannel>,
    max_workers: usize,
}

impl ReconcilePool {
    /// Pool running at most `max_workers` passes at once, at least one.
    /// Failed issues are handed to `retries`; exhausted ones are reported
    /// on `operator`.
    pub fn new(
        reconciler: Arc<Reconciler>,
        retries: Arc<RetryTracker>,
        operator: Arc<dyn OperatorChannel>,
        max_workers: usize,
    ) -> Self {
        Self {
            reconciler,
            retries,
            operator,
            max_workers: max_workers.max(1),
        }
    }

    pub fn retries(&self) -> &Arc<RetryTracker> {
        &self.retries
    }

    /// Reconcile every issue the tracker lists.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, ReconcileError> {
        let issues = self.reconciler.list_issues().await?;
        // Refresh once so workers share a current catalog
        self.reconciler.refresh_catalog().await?;
        Ok(self.run_issues(issues, cancel).await)
    }

    /// Reconcile `issues` once each, skipping those still backing off.
    /// Duplicates are dropped; issues not started before `cancel` fires are
    /// reported as cancelled.
    pub async fn run_issues(&self, mut issues: Vec<IssueNumber>, cancel: &CancellationToken) -> CycleReport {
        issues.sort_unstable();
        issues.dedup();

        let mut report = CycleReport::default();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(issues.len());
        let now = Instant::now();

        for issue in issues {
            if let Some(retry_in) = self.retries.deferred_for(issue, now).await {
                let retry_in_ms = millis(retry_in);
                report.record(issue, IssueReport::Deferred { retry_in_ms });
                continue;
            }
            if cancel.is_cancelled() {
                report.record(issue, IssueReport::Cancelled);
                continue;
            }

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let reconciler = Arc::clone(&self.reconciler);
            let cancel = cancel.clone();
            handles.push((
                issue,
                tokio::spawn(async move {
                    let outcome = reconciler.reconcile_with_cancel(issue, &cancel).await;
                    drop(permit);
                    outcome
                }),
            ));
        }

        for (issue, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => ReconcileOutcome::Failed {
                    reason: format!("worker panicked: {join_error}"),
                    conflict: false,
                },
            };
            let entry = self.settle(issue, outcome).await;
            report.record(issue, entry);
        }

        info!(
            synced = report.synced(),
            failed = report.failed(),
            deferred = report.deferred(),
            cancelled = report.cancelled(),
            "reconciliation cycle finished"
        );
        report
    }

    async fn settle(&self, issue: IssueNumber, outcome: ReconcileOutcome) -> IssueReport {
        match outcome {
            ReconcileOutcome::Synced(summary) => {
                self.retries.record_success(issue).await;
                IssueReport::Synced {
                    changes: summary.changes.len(),
                    rejected: summary.rejected.len(),
                }
            }
            ReconcileOutcome::Cancelled => IssueReport::Cancelled,
            ReconcileOutcome::Failed {
                reason,
                conflict: true,
            } => {
                info!(issue, reason = %reason, "remote changed during pass, retrying next cycle");
                IssueReport::Failed {
                    reason,
                    exhausted: false,
                }
            }
            ReconcileOutcome::Failed { reason, .. } => {
                match self.retries.record_failure(issue, &reason, Instant::now()).await {
                    RetryDecision::RetryIn(backoff) => {
                        warn!(issue, backoff_ms = millis(backoff), "pass failed, will retry");
                        IssueReport::Failed {
                            reason,
                            exhausted: false,
                        }
                    }
                    RetryDecision::Exhausted { attempts, retry_in } => {
                        error!(issue, attempts, retry_in_ms = millis(retry_in), "retries exhausted");
                        self.operator.issue_failed(issue, attempts, &reason);
                        IssueReport::Failed {
                            reason,
                            exhausted: true,
                        }
                    }
                }
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
