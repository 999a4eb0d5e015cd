//! Common test utilities for integration tests
//!
//! Builds a reconciler over the in-memory tracker and snapshot store with
//! a catalog holding every lifecycle label.

use std::sync::Arc;
use std::time::Duration;

use issue_lifecycle::adapters::memory::{InMemorySnapshotStore, InMemoryTracker};
use issue_lifecycle::domain::models::{Catalog, IssueNumber, IssueState, LifecycleConfig};
use issue_lifecycle::domain::ports::SnapshotStore;
use issue_lifecycle::{Reconciler, ReconcilerSettings};

pub const BOT: &str = "lifecycle-bot";

/// Everything a scenario needs to script and inspect a pass.
pub struct Harness {
    pub tracker: Arc<InMemoryTracker>,
    pub store: Arc<InMemorySnapshotStore>,
    pub reconciler: Arc<Reconciler>,
}

#[allow(dead_code)]
impl Harness {
    pub async fn snapshot(&self, issue: IssueNumber) -> Option<IssueState> {
        self.store.load(issue).await.expect("snapshot load")
    }
}

/// Settings with no post delay and an always-stale catalog.
pub fn settings() -> ReconcilerSettings {
    ReconcilerSettings {
        bot_login: BOT.to_string(),
        post_delay: Duration::ZERO,
        catalog_ttl: Duration::ZERO,
        dry_run: false,
    }
}

/// Lifecycle labels plus `#needs-test` and `bug`; alice and bob collaborate.
pub fn catalog() -> Catalog {
    let mut labels = LifecycleConfig::default().referenced_labels();
    labels.insert("#needs-test".to_string());
    labels.insert("bug".to_string());
    Catalog {
        labels,
        milestones: ["Someday", "1.0"].iter().map(|s| (*s).to_string()).collect(),
        collaborators: ["alice", "bob"].iter().map(|s| (*s).to_string()).collect(),
    }
}

pub async fn harness() -> Harness {
    harness_with(InMemoryTracker::new(BOT), settings()).await
}

pub async fn harness_with(tracker: InMemoryTracker, settings: ReconcilerSettings) -> Harness {
    let tracker = Arc::new(tracker);
    tracker.set_catalog(catalog()).await;
    let store = Arc::new(InMemorySnapshotStore::new());
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&tracker) as _,
        Arc::clone(&store) as _,
        LifecycleConfig::default(),
        settings,
    ));
    Harness {
        tracker,
        store,
        reconciler,
    }
}

/// Setup test logging
///
/// Call this at the beginning of tests that need log output.
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
