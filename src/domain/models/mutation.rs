//! The single remote write produced by a reconciliation pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Requested open/close transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateTransition {
    Open,
    Close,
}

impl StateTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
        }
    }

    pub fn target_is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Remote changes for one issue.
///
/// Every field describes a target value rather than a delta against an
/// unknown state, so replaying a mutation converges on the same result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub add_labels: BTreeSet<String>,
    pub remove_labels: BTreeSet<String>,
    pub milestone: Option<String>,
    pub assignee: Option<String>,
    pub transition: Option<StateTransition>,
    pub title: Option<String>,
    pub comment: Option<String>,
}

impl Mutation {
    /// Whether any field write is requested, ignoring the comment.
    pub fn has_field_writes(&self) -> bool {
        !self.add_labels.is_empty()
            || !self.remove_labels.is_empty()
            || self.milestone.is_some()
            || self.assignee.is_some()
            || self.transition.is_some()
            || self.title.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_field_writes() && self.comment.is_none()
    }

    pub fn closes(&self) -> bool {
        self.transition == Some(StateTransition::Close)
    }

    /// Copy of the mutation without the comment body.
    pub fn fields_only(&self) -> Self {
        Self {
            comment: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mutation() {
        let mutation = Mutation::default();
        assert!(mutation.is_empty());
        assert!(!mutation.has_field_writes());
    }

    #[test]
    fn test_comment_only_mutation_is_not_empty() {
        let mutation = Mutation {
            comment: Some("paper trail".to_string()),
            ..Default::default()
        };
        assert!(!mutation.is_empty());
        assert!(!mutation.has_field_writes());
        assert!(mutation.fields_only().is_empty());
    }

    #[test]
    fn test_closes() {
        let mutation = Mutation {
            transition: Some(StateTransition::Close),
            ..Default::default()
        };
        assert!(mutation.closes());
        assert!(!StateTransition::Close.target_is_open());
    }
}
