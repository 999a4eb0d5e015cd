//! Wire types of the GitHub REST API, reduced to the fields we read.

use serde::{Deserialize, Serialize};

use crate::domain::models::{Comment, IssueNumber, RemoteIssue};

#[derive(Debug, Clone, Deserialize)]
pub struct GhUser {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhLabel {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhMilestone {
    pub number: u64,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhIssue {
    pub number: IssueNumber,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<GhLabel>,
    pub milestone: Option<GhMilestone>,
    pub assignee: Option<GhUser>,
    /// Present only when the issue is a pull request
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl GhIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

impl From<GhIssue> for RemoteIssue {
    fn from(issue: GhIssue) -> Self {
        Self {
            number: issue.number,
            labels: issue.labels.into_iter().map(|l| l.name).collect(),
            milestone: issue.milestone.map(|m| m.title),
            assignee: issue.assignee.map(|u| u.login),
            title: issue.title,
            is_open: issue.state == "open",
            // The issue payload does not say who edited it last
            last_actor: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhComment {
    pub id: u64,
    /// Null for comments of deleted accounts
    pub user: Option<GhUser>,
    #[serde(default)]
    pub body: Option<String>,
}

impl From<GhComment> for Comment {
    fn from(comment: GhComment) -> Self {
        Self {
            id: comment.id,
            author: comment.user.map_or_else(|| "ghost".to_string(), |u| u.login),
            body: comment.body.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddLabelsRequest<'a> {
    pub labels: Vec<&'a str>,
}

/// `PATCH /repos/{owner}/{repo}/issues/{number}` body; unset fields are left alone.
#[derive(Debug, Default, Serialize)]
pub struct IssuePatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<&'a str>>,
}

impl IssuePatch<'_> {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.state.is_none() && self.milestone.is_none() && self.assignees.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct CommentRequest<'a> {
    pub body: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreateLabelRequest<'a> {
    pub name: &'a str,
    pub color: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreateMilestoneRequest<'a> {
    pub title: &'a str,
}
