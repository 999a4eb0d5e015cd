use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{IssueNumber, IssueState};
use crate::domain::ports::SnapshotStore;

/// Snapshot store backed by a map, with the same revision rules as SQLite.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<BTreeMap<IssueNumber, IssueState>>,
}

impl InMemorySnapshotStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the snapshot of `issue`, as if the store had been lost.
    pub async fn forget(&self, issue: IssueNumber) {
        self.snapshots.write().await.remove(&issue);
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, issue: IssueNumber) -> DomainResult<Option<IssueState>> {
        Ok(self.snapshots.read().await.get(&issue).cloned())
    }

    async fn save(&self, state: &IssueState, expected_revision: Option<u64>) -> DomainResult<()> {
        let wanted = expected_revision.map_or(1, |r| r + 1);
        if state.revision != wanted {
            return Err(DomainError::ValidationFailed(format!(
                "snapshot for #{} carries revision {} but {} was expected",
                state.issue, state.revision, wanted
            )));
        }

        let mut snapshots = self.snapshots.write().await;
        let stored = snapshots.get(&state.issue).map(|s| s.revision);
        if stored != expected_revision {
            return Err(DomainError::ConcurrencyConflict {
                entity: "issue snapshot".to_string(),
                id: state.issue.to_string(),
            });
        }
        snapshots.insert(state.issue, state.clone());
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<IssueState>> {
        Ok(self.snapshots.read().await.values().cloned().collect())
    }
}
