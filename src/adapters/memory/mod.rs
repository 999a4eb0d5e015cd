//! In-memory adapters.
//!
//! Scriptable stand-ins for the tracker and the snapshot store, used by
//! the test suites and benchmarks.

mod snapshot_store;
mod tracker;

pub use snapshot_store::InMemorySnapshotStore;
pub use tracker::{InMemoryTracker, TrackerCall};
