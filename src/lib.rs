//! Issue lifecycle automation for hosted issue trackers
//!
//! Watches a repository's issues, executes commands written in comments
//! (`+label`, `-label`, `milestone=`, `assignee=`, `+1`/`-1` votes),
//! enforces label rules, keeps a vote tally in the title and posts a
//! paper trail comment for every change it makes or observes.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, port traits and errors
//! - **Service Layer** (`services`): parsing, label policy, planning and the reconciliation engine
//! - **Adapters** (`adapters`): GitHub, SQLite and in-memory implementations of the ports
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, request budget and retry policy
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use issue_lifecycle::adapters::memory::{InMemorySnapshotStore, InMemoryTracker};
//! use issue_lifecycle::services::{Reconciler, ReconcilerSettings};
//!
//! let tracker = Arc::new(InMemoryTracker::new("bot"));
//! let store = Arc::new(InMemorySnapshotStore::new());
//! let settings = ReconcilerSettings::from_worker("bot", &Default::default());
//! let reconciler = Reconciler::new(tracker, store, Default::default(), settings);
//! let outcome = reconciler.reconcile(42).await;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Catalog, Comment, Config, IssueNumber, IssueState, LifecycleConfig, Mutation, ReconcileOutcome, RemoteIssue,
};
pub use domain::{DomainError, DomainResult, ReconcileError, TransportError};
pub use infrastructure::config::ConfigLoader;
pub use services::{ReconcilePool, Reconciler, ReconcilerSettings};
