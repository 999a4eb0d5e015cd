//! Structured commands extracted from comment text.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::issue::{CommentId, UserId};

/// What a single comment line asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DirectiveKind {
    AddLabel(String),
    RemoveLabel(String),
    SetMilestone(String),
    SetAssignee(String),
    Vote { user: UserId, delta: i8 },
}

impl DirectiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddLabel(_) => "add_label",
            Self::RemoveLabel(_) => "remove_label",
            Self::SetMilestone(_) => "set_milestone",
            Self::SetAssignee(_) => "set_assignee",
            Self::Vote { .. } => "vote",
        }
    }
}

/// A directive together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub comment_id: CommentId,
    pub author: UserId,
    /// Position in the pass's directive sequence
    pub ordinal: usize,
    /// Trimmed source line, used when reporting rejections
    pub source: String,
}

/// Why a directive was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionKind {
    /// Unknown label, milestone or assignee
    Validation,
    /// Author lacks the required scope
    Permission,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Permission => "permission",
        }
    }
}

/// A dropped directive, reported in the paper trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveRejection {
    pub directive: Directive,
    pub kind: RejectionKind,
    pub reason: String,
}

impl DirectiveRejection {
    pub fn validation(directive: Directive, reason: impl Into<String>) -> Self {
        Self {
            directive,
            kind: RejectionKind::Validation,
            reason: reason.into(),
        }
    }

    pub fn permission(directive: Directive, reason: impl Into<String>) -> Self {
        Self {
            directive,
            kind: RejectionKind::Permission,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DirectiveRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` from @{}: {}",
            self.directive.source, self.directive.author, self.reason
        )
    }
}
