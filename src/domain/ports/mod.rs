//! Ports (trait interfaces) for the issue lifecycle domain.

pub mod issue_tracker;
pub mod operator;
pub mod snapshot_store;

pub use issue_tracker::IssueTracker;
pub use operator::{LogOperatorChannel, OperatorChannel};
pub use snapshot_store::SnapshotStore;
