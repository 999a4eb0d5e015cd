//! Per-issue failure bookkeeping across cycles.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::models::IssueNumber;
use crate::infrastructure::retry::RetryPolicy;

/// Failure history of one issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEntry {
    pub failures: u32,
    pub next_attempt: Instant,
    pub last_error: String,
    /// Operator already alerted for this failure streak
    pub alerted: bool,
}

/// What the caller should do after a failed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again once the backoff has elapsed
    RetryIn(Duration),
    /// Retry budget just ran out; alert the operator
    Exhausted { attempts: u32, retry_in: Duration },
}

/// Tracks which issues are backing off after failed passes.
///
/// Failed issues keep being retried at the capped backoff after
/// exhaustion, so a recovered tracker heals them without intervention.
#[derive(Debug)]
pub struct RetryTracker {
    policy: RetryPolicy,
    entries: Mutex<HashMap<IssueNumber, RetryEntry>>,
}

impl RetryTracker {
    /// Empty tracker scheduling retries with `policy`.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Remaining backoff for `issue`, or `None` when a pass may run now.
    pub async fn deferred_for(&self, issue: IssueNumber, now: Instant) -> Option<Duration> {
        let entries = self.entries.lock().await;
        entries
            .get(&issue)
            .filter(|entry| entry.next_attempt > now)
            .map(|entry| entry.next_attempt - now)
    }

    /// Count a failed pass and schedule the next attempt.
    ///
    /// Returns [`RetryDecision::Exhausted`] once, the first time the policy
    /// gives up on the issue; later failures keep backing off.
    pub async fn record_failure(
        &self,
        issue: IssueNumber,
        reason: &str,
        now: Instant,
    ) -> RetryDecision {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(issue).or_insert_with(|| RetryEntry {
            failures: 0,
            next_attempt: now,
            last_error: String::new(),
            alerted: false,
        });
        entry.failures = entry.failures.saturating_add(1);
        entry.last_error = reason.to_string();
        let backoff = self.policy.calculate_backoff(entry.failures);
        entry.next_attempt = now + backoff;

        if self.policy.is_exhausted(entry.failures) && !entry.alerted {
            entry.alerted = true;
            RetryDecision::Exhausted {
                attempts: entry.failures,
                retry_in: backoff,
            }
        } else {
            RetryDecision::RetryIn(backoff)
        }
    }

    pub async fn record_success(&self, issue: IssueNumber) {
        self.entries.lock().await.remove(&issue);
    }

    /// Issues whose last pass failed, ordered by issue number.
    pub async fn failing(&self) -> Vec<(IssueNumber, RetryEntry)> {
        let entries = self.entries.lock().await;
        let mut failing: Vec<_> = entries.iter().map(|(k, v)| (*k, v.clone())).collect();
        failing.sort_by_key(|(issue, _)| *issue);
        failing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_defers_issue() {
        let tracker = RetryTracker::new(RetryPolicy::new(3, 1_000, 10_000));
        let now = Instant::now();

        assert!(tracker.deferred_for(1, now).await.is_none());
        let decision = tracker.record_failure(1, "timeout", now).await;
        assert_eq!(decision, RetryDecision::RetryIn(Duration::from_secs(1)));
        assert_eq!(tracker.deferred_for(1, now).await, Some(Duration::from_secs(1)));
        assert!(tracker.deferred_for(1, now + Duration::from_secs(1)).await.is_none());
        assert!(tracker.deferred_for(2, now).await.is_none());
    }

    #[tokio::test]
    async fn test_exhaustion_alerts_once() {
        let tracker = RetryTracker::new(RetryPolicy::new(2, 1_000, 10_000));
        let now = Instant::now();

        tracker.record_failure(1, "boom", now).await;
        let second = tracker.record_failure(1, "boom", now).await;
        assert_eq!(
            second,
            RetryDecision::Exhausted {
                attempts: 2,
                retry_in: Duration::from_secs(2)
            }
        );
        let third = tracker.record_failure(1, "boom", now).await;
        assert_eq!(third, RetryDecision::RetryIn(Duration::from_secs(4)));
    }

    #[tokio::test]
    async fn test_success_clears_history() {
        let tracker = RetryTracker::new(RetryPolicy::new(2, 1_000, 10_000));
        let now = Instant::now();
        tracker.record_failure(1, "boom", now).await;
        assert_eq!(tracker.failing().await.len(), 1);

        tracker.record_success(1).await;
        assert!(tracker.failing().await.is_empty());
        assert!(tracker.deferred_for(1, now).await.is_none());
    }
}
