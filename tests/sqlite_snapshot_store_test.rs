//! File-backed snapshot store across process restarts.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use issue_lifecycle::adapters::memory::InMemoryTracker;
use issue_lifecycle::adapters::sqlite::{initialize_database, SqliteSnapshotStore};
use issue_lifecycle::domain::models::{IssueState, LifecycleConfig};
use issue_lifecycle::domain::ports::SnapshotStore;
use issue_lifecycle::{DomainError, Reconciler};
use tempfile::TempDir;

use common::{catalog, settings, BOT};

fn db_path(dir: &TempDir) -> String {
    dir.path().join("state").join("snapshots.db").display().to_string()
}

fn state(issue: u64, revision: u64) -> IssueState {
    IssueState {
        issue,
        labels: ["#accepted".to_string()].into_iter().collect(),
        milestone: Some("1.0".to_string()),
        assignee: Some("alice".to_string()),
        title: "Widget [+2]".to_string(),
        is_open: true,
        votes: BTreeMap::from([("alice".to_string(), 1), ("bob".to_string(), 1)]),
        last_processed_comment_id: Some(4_000_000_000),
        revision,
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = db_path(&dir);

    {
        let pool = initialize_database(&path, 2).await.expect("init");
        let store = SqliteSnapshotStore::new(pool.clone());
        store.save(&state(9, 1), None).await.expect("insert");
        store.save(&state(9, 2), Some(1)).await.expect("update");
        pool.close().await;
    }

    let pool = initialize_database(&path, 2).await.expect("reopen");
    let store = SqliteSnapshotStore::new(pool);
    let loaded = store.load(9).await.expect("load").expect("snapshot");
    assert_eq!(loaded.revision, 2);
    assert_eq!(loaded.votes.len(), 2);
    assert_eq!(loaded.assignee.as_deref(), Some("alice"));
    assert_eq!(loaded.last_processed_comment_id, Some(4_000_000_000));
    assert_eq!(store.list().await.expect("list").len(), 1);
}

#[tokio::test]
async fn test_stale_writer_loses() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let pool = initialize_database(&db_path(&dir), 2).await.expect("init");
    let first = SqliteSnapshotStore::new(pool.clone());
    let second = SqliteSnapshotStore::new(pool);

    first.save(&state(3, 1), None).await.expect("insert");
    first.save(&state(3, 2), Some(1)).await.expect("first writer");

    match second.save(&state(3, 2), Some(1)).await {
        Err(DomainError::ConcurrencyConflict { id, .. }) => assert_eq!(id, "3"),
        other => panic!("Expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_restart_does_not_repeat_paper_trail() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = db_path(&dir);
    let tracker = Arc::new(InMemoryTracker::new(BOT));
    tracker.set_catalog(catalog()).await;
    tracker.add_issue(1, "Widget", &[]).await;

    for _ in 0..2 {
        let pool = initialize_database(&path, 2).await.expect("init");
        let store = Arc::new(SqliteSnapshotStore::new(pool.clone()));
        let reconciler = Reconciler::new(
            Arc::clone(&tracker) as _,
            store as _,
            LifecycleConfig::default(),
            settings(),
        );
        assert!(reconciler.reconcile(1).await.is_synced());
        pool.close().await;
    }

    assert_eq!(tracker.own_comments(1).await.len(), 1);
    assert_eq!(tracker.mutations().await.len(), 1);
}
