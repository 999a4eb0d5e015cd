//! Per-issue mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::models::IssueNumber;

type Registry = HashMap<IssueNumber, Arc<AsyncMutex<()>>>;

/// Registry of one async lock per issue.
///
/// Different issues never contend; two passes over the same issue run one
/// after the other. An issue's entry lives only while someone holds or
/// waits for its lock.
#[derive(Debug, Default)]
pub struct IssueLocks {
    locks: Mutex<Registry>,
}

/// Exclusive access to one issue; released on drop.
#[derive(Debug)]
pub struct IssueGuard<'a> {
    locks: &'a IssueLocks,
    issue: IssueNumber,
    guard: Option<OwnedMutexGuard<()>>,
}

impl IssueLocks {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `issue`.
    pub async fn acquire(&self, issue: IssueNumber) -> IssueGuard<'_> {
        let lock = self.entry(issue);
        let guard = lock.lock_owned().await;
        IssueGuard {
            locks: self,
            issue,
            guard: Some(guard),
        }
    }

    /// Try to take the lock without waiting.
    pub fn try_acquire(&self, issue: IssueNumber) -> Option<IssueGuard<'_>> {
        let lock = self.entry(issue);
        match lock.try_lock_owned() {
            Ok(guard) => Some(IssueGuard {
                locks: self,
                issue,
                guard: Some(guard),
            }),
            Err(_) => {
                self.prune(issue);
                None
            }
        }
    }

    /// Number of issues currently locked or awaited.
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, issue: IssueNumber) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.registry().entry(issue).or_default())
    }

    // Callers must have dropped their own handle to the issue's lock
    fn prune(&self, issue: IssueNumber) {
        let mut registry = self.registry();
        if registry
            .get(&issue)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            registry.remove(&issue);
        }
    }
}

impl Drop for IssueGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.prune(self.issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_issue_is_exclusive() {
        let locks = IssueLocks::new();
        let guard = locks.acquire(1).await;
        assert!(locks.try_acquire(1).is_none());
        drop(guard);
        assert!(locks.try_acquire(1).is_some());
    }

    #[tokio::test]
    async fn test_different_issues_do_not_contend() {
        let locks = IssueLocks::new();
        let _first = locks.acquire(1).await;
        assert!(locks.try_acquire(2).is_some());
    }

    #[tokio::test]
    async fn test_released_issues_leave_the_registry() {
        let locks = IssueLocks::new();
        for issue in 0..50 {
            let _guard = locks.acquire(issue).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());

        let held = locks.acquire(7).await;
        assert!(locks.try_acquire(7).is_none());
        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_the_entry_alive() {
        let locks = Arc::new(IssueLocks::new());
        let held = locks.acquire(3).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(3).await;
            })
        };
        // Let the waiter register before releasing
        while Arc::strong_count(&locks.entry(3)) < 4 {
            tokio::task::yield_now().await;
        }
        drop(held);
        waiter.await.expect("waiter panicked");

        assert!(locks.is_empty());
    }
}
