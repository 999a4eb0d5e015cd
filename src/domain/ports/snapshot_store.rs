//! Snapshot store port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{IssueNumber, IssueState};

/// Durable per-issue record of the last-seen state.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, issue: IssueNumber) -> DomainResult<Option<IssueState>>;

    /// Persist `state`, which must carry `expected_revision + 1`.
    ///
    /// `expected_revision` is `None` when no snapshot is expected to exist.
    /// A mismatch fails with `DomainError::ConcurrencyConflict` and leaves
    /// the stored row untouched.
    async fn save(&self, state: &IssueState, expected_revision: Option<u64>) -> DomainResult<()>;

    /// All snapshots ordered by issue number.
    async fn list(&self) -> DomainResult<Vec<IssueState>>;
}
