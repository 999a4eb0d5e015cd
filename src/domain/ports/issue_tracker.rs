//! Issue tracker port.

use async_trait::async_trait;

use crate::domain::errors::TransportError;
use crate::domain::models::{Catalog, Comment, CommentId, IssueNumber, Mutation, RemoteIssue, UserId};

/// Transport to the external issue tracker.
///
/// Implementations perform no lifecycle logic. Every write is expressed
/// as target values so repeating it is harmless.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Login of the account the adapter acts as.
    async fn current_user(&self) -> Result<UserId, TransportError>;

    /// All issue numbers worth reconciling, pull requests excluded.
    async fn list_issues(&self) -> Result<Vec<IssueNumber>, TransportError>;

    /// Valid labels, milestones and collaborators.
    async fn fetch_catalog(&self) -> Result<Catalog, TransportError>;

    async fn fetch_issue(&self, issue: IssueNumber) -> Result<RemoteIssue, TransportError>;

    /// Comments with an id greater than `since`, oldest first.
    async fn fetch_new_comments(
        &self,
        issue: IssueNumber,
        since: Option<CommentId>,
    ) -> Result<Vec<Comment>, TransportError>;

    /// Apply the field writes of `mutation`. The comment is ignored.
    async fn apply_mutation(&self, issue: IssueNumber, mutation: &Mutation) -> Result<(), TransportError>;

    async fn post_comment(&self, issue: IssueNumber, body: &str) -> Result<CommentId, TransportError>;

    /// Create the label if the tracker does not know it.
    async fn ensure_label(&self, name: &str) -> Result<(), TransportError>;

    /// Create the milestone if the tracker does not know it.
    async fn ensure_milestone(&self, name: &str) -> Result<(), TransportError>;
}
