//! Issue state as tracked by the snapshot store and as observed remotely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Tracker-assigned issue number.
pub type IssueNumber = u64;

/// Tracker-assigned comment identifier. Monotonic per issue.
pub type CommentId = u64;

/// Tracker login of a user.
pub type UserId = String;

/// Durable record of the last state the reconciler agreed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueState {
    pub issue: IssueNumber,
    pub labels: BTreeSet<String>,
    pub milestone: Option<String>,
    pub assignee: Option<UserId>,
    pub title: String,
    pub is_open: bool,
    /// Last vote per user, each in {-1, 0, +1}
    pub votes: BTreeMap<UserId, i8>,
    pub last_processed_comment_id: Option<CommentId>,
    /// Incremented on every successful persist
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl IssueState {
    /// Snapshot that mirrors the remote issue verbatim at revision 0.
    ///
    /// The baseline of an issue seen for the first time.
    pub fn adopt(issue: IssueNumber, remote: &RemoteIssue) -> Self {
        Self {
            issue,
            labels: remote.labels.clone(),
            milestone: remote.milestone.clone(),
            assignee: remote.assignee.clone(),
            title: remote.title.clone(),
            is_open: remote.is_open,
            votes: BTreeMap::new(),
            last_processed_comment_id: None,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    /// Whether the tracked fields (ignoring bookkeeping) match `other`.
    pub fn same_fields(&self, other: &Self) -> bool {
        self.labels == other.labels
            && self.milestone == other.milestone
            && self.assignee == other.assignee
            && self.title == other.title
            && self.is_open == other.is_open
            && self.votes == other.votes
    }
}

/// Issue metadata as reported by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIssue {
    pub number: IssueNumber,
    pub labels: BTreeSet<String>,
    pub milestone: Option<String>,
    pub assignee: Option<UserId>,
    pub title: String,
    pub is_open: bool,
    /// Who last touched the issue, when the tracker reports it
    #[serde(default)]
    pub last_actor: Option<UserId>,
}

impl RemoteIssue {
    /// Compare observable fields, ignoring actor attribution.
    pub fn same_state(&self, other: &Self) -> bool {
        self.labels == other.labels
            && self.milestone == other.milestone
            && self.assignee == other.assignee
            && self.title == other.title
            && self.is_open == other.is_open
    }

    /// Describe the first field that differs from `other`.
    pub fn describe_drift(&self, other: &Self) -> Option<String> {
        if self.labels != other.labels {
            Some(format!("labels {:?} -> {:?}", self.labels, other.labels))
        } else if self.milestone != other.milestone {
            Some(format!("milestone {:?} -> {:?}", self.milestone, other.milestone))
        } else if self.assignee != other.assignee {
            Some(format!("assignee {:?} -> {:?}", self.assignee, other.assignee))
        } else if self.title != other.title {
            Some(format!("title {:?} -> {:?}", self.title, other.title))
        } else if self.is_open != other.is_open {
            Some(format!("open {} -> {}", self.is_open, other.is_open))
        } else {
            None
        }
    }
}

/// A single tracker comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: UserId,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> RemoteIssue {
        RemoteIssue {
            number: 7,
            labels: ["#new".to_string()].into_iter().collect(),
            milestone: Some("Someday".to_string()),
            assignee: None,
            title: "Crash on start".to_string(),
            is_open: true,
            last_actor: None,
        }
    }

    #[test]
    fn test_adopt_mirrors_remote() {
        let state = IssueState::adopt(7, &remote());
        assert!(state.labels.contains("#new"));
        assert_eq!(state.milestone.as_deref(), Some("Someday"));
        assert_eq!(state.title, "Crash on start");
        assert_eq!(state.revision, 0);
        assert!(state.votes.is_empty());
    }

    #[test]
    fn test_same_state_ignores_actor() {
        let a = remote();
        let mut b = remote();
        b.last_actor = Some("alice".to_string());
        assert!(a.same_state(&b));
        assert!(a.describe_drift(&b).is_none());

        b.is_open = false;
        assert!(!a.same_state(&b));
        assert_eq!(a.describe_drift(&b).as_deref(), Some("open true -> false"));
    }
}
