//! Reconciliation results: change lists, outcomes and cycle reports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::directive::DirectiveRejection;
use super::issue::{IssueNumber, UserId};
use super::mutation::Mutation;

/// Lifecycle of an issue as seen by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    NotTracked,
    Synced,
    Reconciling,
    Failed,
}

impl ReconcileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotTracked => "not_tracked",
            Self::Synced => "synced",
            Self::Reconciling => "reconciling",
            Self::Failed => "failed",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotTracked | Self::Synced | Self::Failed, Self::Reconciling)
                | (Self::Reconciling, Self::Synced | Self::Failed)
        )
    }
}

/// Who or what caused a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Attribution {
    /// Explicit comment directive
    User { login: UserId },
    /// Consequence of another label change
    Implicit { cause: String },
    /// Applied to an untriaged issue
    Defaults,
    /// Changed on the tracker outside of comment commands
    External { actor: Option<UserId> },
    /// Aggregate of recorded votes
    Votes,
}

/// One tracked field that differs from the previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum ChangeKind {
    LabelAdded { label: String },
    LabelRemoved { label: String },
    Milestone { from: Option<String>, to: Option<String> },
    Assignee { from: Option<String>, to: Option<String> },
    Opened,
    Closed,
    Tally { from: i64, to: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub kind: ChangeKind,
    pub attribution: Attribution,
}

impl FieldChange {
    pub fn new(kind: ChangeKind, attribution: Attribution) -> Self {
        Self { kind, attribution }
    }
}

/// What a successful pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub changes: Vec<FieldChange>,
    pub rejected: Vec<DirectiveRejection>,
    pub mutation: Mutation,
    /// Number of directives that passed validation and permission checks
    pub accepted: usize,
    /// Snapshot was missing but the bot had already commented
    pub adopted: bool,
    /// Paper trail already present remotely, not posted again
    pub deduplicated: bool,
    pub dry_run: bool,
}

/// Result of `reconcile(issue)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Synced(PassSummary),
    /// `conflict` failures are retried next cycle without backoff
    Failed { reason: String, conflict: bool },
    Cancelled,
}

impl ReconcileOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced(_))
    }

    pub fn status(&self) -> ReconcileStatus {
        match self {
            Self::Synced(_) => ReconcileStatus::Synced,
            Self::Failed { .. } => ReconcileStatus::Failed,
            Self::Cancelled => ReconcileStatus::Reconciling,
        }
    }
}

/// Per-issue entry of a cycle report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IssueReport {
    Synced { changes: usize, rejected: usize },
    Failed { reason: String, exhausted: bool },
    /// Skipped this cycle because its retry backoff has not expired
    Deferred { retry_in_ms: u64 },
    Cancelled,
}

/// Aggregate outcome of one pool cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub issues: BTreeMap<IssueNumber, IssueReport>,
}

impl CycleReport {
    pub fn record(&mut self, issue: IssueNumber, report: IssueReport) {
        self.issues.insert(issue, report);
    }

    fn count(&self, pred: impl Fn(&IssueReport) -> bool) -> usize {
        self.issues.values().filter(|r| pred(r)).count()
    }

    pub fn synced(&self) -> usize {
        self.count(|r| matches!(r, IssueReport::Synced { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, IssueReport::Failed { .. }))
    }

    pub fn deferred(&self) -> usize {
        self.count(|r| matches!(r, IssueReport::Deferred { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|r| matches!(r, IssueReport::Cancelled))
    }
}
