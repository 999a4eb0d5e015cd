//! Worker pool behaviour across cycles.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use issue_lifecycle::adapters::memory::{InMemoryTracker, TrackerCall};
use issue_lifecycle::domain::models::{IssueNumber, IssueReport};
use issue_lifecycle::domain::ports::OperatorChannel;
use issue_lifecycle::infrastructure::retry::RetryPolicy;
use issue_lifecycle::services::RetryTracker;
use issue_lifecycle::{ReconcilePool, TransportError};
use tokio_util::sync::CancellationToken;

use common::{harness, harness_with, settings, Harness, BOT};

/// Records every alert it receives.
#[derive(Default)]
struct RecordingOperator {
    alerts: Mutex<Vec<(IssueNumber, u32)>>,
}

impl RecordingOperator {
    fn alerts(&self) -> Vec<(IssueNumber, u32)> {
        self.alerts.lock().expect("alerts lock").clone()
    }
}

impl OperatorChannel for RecordingOperator {
    fn issue_failed(&self, issue: IssueNumber, attempts: u32, _reason: &str) {
        self.alerts.lock().expect("alerts lock").push((issue, attempts));
    }
}

fn build_pool(h: &Harness, policy: RetryPolicy, max_workers: usize) -> (ReconcilePool, Arc<RecordingOperator>) {
    let operator = Arc::new(RecordingOperator::default());
    let pool = ReconcilePool::new(
        Arc::clone(&h.reconciler),
        Arc::new(RetryTracker::new(policy)),
        Arc::clone(&operator) as _,
        max_workers,
    );
    (pool, operator)
}

fn network_error() -> TransportError {
    TransportError::Network("connection reset".to_string())
}

#[tokio::test]
async fn test_in_flight_calls_bounded_by_workers() {
    let h = harness_with(
        InMemoryTracker::new(BOT).with_latency(Duration::from_millis(10)),
        settings(),
    )
    .await;
    for issue in 1..=8 {
        h.tracker.add_issue(issue, &format!("Issue {issue}"), &[]).await;
    }
    let (pool, _) = build_pool(&h, RetryPolicy::default(), 2);

    let report = pool.run_cycle(&CancellationToken::new()).await.expect("cycle");

    assert_eq!(report.synced(), 8);
    assert_eq!(h.tracker.max_in_flight(), 2);
    for issue in 1..=8 {
        assert_eq!(h.tracker.own_comments(issue).await.len(), 1);
    }
}

#[tokio::test]
async fn test_failed_issue_is_deferred_next_cycle() {
    let h = harness().await;
    h.tracker.add_issue(1, "First", &[]).await;
    h.tracker.add_issue(2, "Second", &[]).await;
    h.tracker.fail_next(TrackerCall::FetchIssue, network_error()).await;
    let (pool, operator) = build_pool(&h, RetryPolicy::new(3, 60_000, 600_000), 1);
    let cancel = CancellationToken::new();

    let first = pool.run_cycle(&cancel).await.expect("first cycle");
    assert!(matches!(
        first.issues.get(&1),
        Some(IssueReport::Failed { exhausted: false, .. })
    ));
    assert!(matches!(first.issues.get(&2), Some(IssueReport::Synced { .. })));

    let second = pool.run_cycle(&cancel).await.expect("second cycle");
    assert!(matches!(second.issues.get(&1), Some(IssueReport::Deferred { .. })));
    assert_eq!(second.deferred(), 1);
    assert!(operator.alerts().is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_alert_operator_once() {
    let h = harness().await;
    h.tracker.add_issue(1, "Flaky", &[]).await;
    for _ in 0..3 {
        h.tracker.fail_next(TrackerCall::FetchIssue, network_error()).await;
    }
    // Zero backoff so every cycle retries immediately
    let (pool, operator) = build_pool(&h, RetryPolicy::new(2, 0, 0), 1);
    let cancel = CancellationToken::new();

    let first = pool.run_cycle(&cancel).await.expect("cycle");
    assert!(matches!(
        first.issues.get(&1),
        Some(IssueReport::Failed { exhausted: false, .. })
    ));
    let second = pool.run_cycle(&cancel).await.expect("cycle");
    assert!(matches!(
        second.issues.get(&1),
        Some(IssueReport::Failed { exhausted: true, .. })
    ));
    pool.run_cycle(&cancel).await.expect("cycle");
    assert_eq!(operator.alerts(), vec![(1, 2)]);

    // The tracker recovered; the issue heals without intervention
    let healed = pool.run_cycle(&cancel).await.expect("cycle");
    assert!(matches!(healed.issues.get(&1), Some(IssueReport::Synced { .. })));
    assert!(pool.retries().failing().await.is_empty());
}

#[tokio::test]
async fn test_conflict_is_retried_without_backoff() {
    let h = harness().await;
    h.tracker.add_issue(1, "Racy", &[]).await;
    h.tracker
        .on_fetch(1, 2, |remote| {
            remote.labels.insert("bug".to_string());
        })
        .await;
    let (pool, operator) = build_pool(&h, RetryPolicy::new(3, 60_000, 600_000), 1);
    let cancel = CancellationToken::new();

    let first = pool.run_cycle(&cancel).await.expect("cycle");
    assert_eq!(first.failed(), 1);
    assert!(pool.retries().failing().await.is_empty());

    let second = pool.run_cycle(&cancel).await.expect("cycle");
    assert_eq!(second.synced(), 1);
    assert!(operator.alerts().is_empty());
}

#[tokio::test]
async fn test_cancelled_cycle_starts_no_passes() {
    let h = harness().await;
    h.tracker.add_issue(1, "One", &[]).await;
    h.tracker.add_issue(2, "Two", &[]).await;
    let (pool, _) = build_pool(&h, RetryPolicy::default(), 4);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = pool.run_issues(vec![2, 1, 2], &cancel).await;

    assert_eq!(report.cancelled(), 2);
    assert_eq!(report.issues.len(), 2);
    assert_eq!(h.tracker.calls(TrackerCall::ApplyMutation).await, 0);
}

#[tokio::test]
async fn test_listing_failure_aborts_cycle() {
    let h = harness().await;
    h.tracker.fail_next(TrackerCall::ListIssues, network_error()).await;
    let (pool, _) = build_pool(&h, RetryPolicy::default(), 2);

    assert!(pool.run_cycle(&CancellationToken::new()).await.is_err());
}
