//! `IssueTracker` over the GitHub REST API.

use async_trait::async_trait;
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::errors::TransportError;
use crate::domain::models::{
    Catalog, Comment, CommentId, IssueNumber, Mutation, RemoteIssue, StateTransition, TrackerConfig, UserId,
};
use crate::domain::ports::IssueTracker;
use crate::infrastructure::rate_limiter::RequestBudget;

use super::client::GitHubClient;
use super::models::{
    AddLabelsRequest, CommentRequest, CreateLabelRequest, CreateMilestoneRequest, GhComment, GhIssue, GhLabel,
    GhMilestone, GhUser, IssuePatch,
};

pub struct GitHubTracker {
    client: GitHubClient,
    owner: String,
    repo: String,
    label_color: String,
    /// Lower-cased milestone title to milestone number
    milestones: RwLock<HashMap<String, u64>>,
}

impl GitHubTracker {
    /// Tracker for `owner/repo` of `config`.
    ///
    /// Every HTTP request is bounded by `request_timeout`. Fails only when
    /// the HTTP client cannot be built.
    pub fn new(config: &TrackerConfig, request_timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: GitHubClient::new(config, request_timeout)?,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            label_color: config.label_color.clone(),
            milestones: RwLock::new(HashMap::new()),
        })
    }

    /// Share `budget` across every request this tracker sends.
    #[must_use]
    pub fn with_budget(mut self, budget: Arc<RequestBudget>) -> Self {
        self.client = self.client.with_budget(budget);
        self
    }

    fn repo_url(&self, rest: &[&str]) -> Result<reqwest::Url, TransportError> {
        let mut segments = vec!["repos", self.owner.as_str(), self.repo.as_str()];
        segments.extend_from_slice(rest);
        self.client.url(&segments)
    }

    async fn load_milestones(&self) -> Result<Vec<GhMilestone>, TransportError> {
        let mut url = self.repo_url(&["milestones"])?;
        url.query_pairs_mut().append_pair("state", "all");
        let milestones: Vec<GhMilestone> = self.client.get_pages(url).await?;
        let mut cache = self.milestones.write().await;
        cache.clear();
        cache.extend(milestones.iter().map(|m| (m.title.to_lowercase(), m.number)));
        Ok(milestones)
    }

    async fn milestone_number(&self, title: &str) -> Result<u64, TransportError> {
        let key = title.to_lowercase();
        if let Some(number) = self.milestones.read().await.get(&key) {
            return Ok(*number);
        }
        self.load_milestones().await?;
        self.milestones
            .read()
            .await
            .get(&key)
            .copied()
            .ok_or_else(|| TransportError::NotFound(format!("milestone {title}")))
    }
}

#[async_trait]
impl IssueTracker for GitHubTracker {
    async fn current_user(&self) -> Result<UserId, TransportError> {
        let user: GhUser = self.client.get_json(self.client.url(&["user"])?).await?;
        Ok(user.login)
    }

    async fn list_issues(&self) -> Result<Vec<IssueNumber>, TransportError> {
        let mut url = self.repo_url(&["issues"])?;
        url.query_pairs_mut()
            .append_pair("state", "all")
            .append_pair("sort", "created")
            .append_pair("direction", "asc");
        let issues: Vec<GhIssue> = self.client.get_pages(url).await?;
        Ok(issues
            .into_iter()
            .filter(|i| !i.is_pull_request())
            .map(|i| i.number)
            .collect())
    }

    async fn fetch_catalog(&self) -> Result<Catalog, TransportError> {
        let labels: Vec<GhLabel> = self.client.get_pages(self.repo_url(&["labels"])?).await?;
        let milestones = self.load_milestones().await?;
        let collaborators: Vec<GhUser> = self.client.get_pages(self.repo_url(&["collaborators"])?).await?;

        Ok(Catalog {
            labels: labels.into_iter().map(|l| l.name).collect(),
            milestones: milestones.into_iter().map(|m| m.title).collect(),
            collaborators: collaborators.into_iter().map(|u| u.login).collect(),
        })
    }

    async fn fetch_issue(&self, issue: IssueNumber) -> Result<RemoteIssue, TransportError> {
        let number = issue.to_string();
        let payload: GhIssue = self.client.get_json(self.repo_url(&["issues", number.as_str()])?).await?;
        Ok(payload.into())
    }

    async fn fetch_new_comments(
        &self,
        issue: IssueNumber,
        since: Option<CommentId>,
    ) -> Result<Vec<Comment>, TransportError> {
        let number = issue.to_string();
        let url = self.repo_url(&["issues", number.as_str(), "comments"])?;
        let comments: Vec<GhComment> = match since {
            None => self.client.get_pages(url).await?,
            Some(since) => {
                self.client
                    .get_tail_pages(url, |page: &[GhComment]| page.iter().any(|c| c.id <= since))
                    .await?
            }
        };
        let mut comments: Vec<Comment> = comments
            .into_iter()
            .filter(|c| since.is_none_or(|since| c.id > since))
            .map(Comment::from)
            .collect();
        comments.sort_by_key(|c| c.id);
        Ok(comments)
    }

    async fn apply_mutation(&self, issue: IssueNumber, mutation: &Mutation) -> Result<(), TransportError> {
        let number = issue.to_string();

        for label in &mutation.remove_labels {
            let url = self.repo_url(&["issues", number.as_str(), "labels", label.as_str()])?;
            match self.client.send(Method::DELETE, url, None::<&()>, true).await {
                // Already gone
                Ok(_) | Err(TransportError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        if !mutation.add_labels.is_empty() {
            let body = AddLabelsRequest {
                labels: mutation.add_labels.iter().map(String::as_str).collect(),
            };
            let url = self.repo_url(&["issues", number.as_str(), "labels"])?;
            self.client.send(Method::POST, url, Some(&body), true).await?;
        }

        let milestone = match &mutation.milestone {
            Some(title) => Some(self.milestone_number(title).await?),
            None => None,
        };
        let patch = IssuePatch {
            title: mutation.title.as_deref(),
            state: mutation.transition.map(|t| match t {
                StateTransition::Open => "open",
                StateTransition::Close => "closed",
            }),
            milestone,
            assignees: mutation.assignee.as_deref().map(|a| vec![a]),
        };
        if !patch.is_empty() {
            let url = self.repo_url(&["issues", number.as_str()])?;
            self.client.send(Method::PATCH, url, Some(&patch), true).await?;
        }

        debug!(issue, "mutation applied");
        Ok(())
    }

    async fn post_comment(&self, issue: IssueNumber, body: &str) -> Result<CommentId, TransportError> {
        let number = issue.to_string();
        let url = self.repo_url(&["issues", number.as_str(), "comments"])?;
        // A retried POST could post the paper trail twice
        let response = self
            .client
            .send(Method::POST, url, Some(&CommentRequest { body }), false)
            .await?;
        let comment: GhComment = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(comment.id)
    }

    async fn ensure_label(&self, name: &str) -> Result<(), TransportError> {
        let body = CreateLabelRequest {
            name,
            color: &self.label_color,
        };
        match self.client.send(Method::POST, self.repo_url(&["labels"])?, Some(&body), true).await {
            Ok(_) => {
                info!(label = name, "label created");
                Ok(())
            }
            // 422: already exists
            Err(TransportError::Status { status: 422, .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn ensure_milestone(&self, name: &str) -> Result<(), TransportError> {
        let body = CreateMilestoneRequest { title: name };
        match self.client.send(Method::POST, self.repo_url(&["milestones"])?, Some(&body), true).await {
            Ok(response) => {
                let created: GhMilestone = response
                    .json()
                    .await
                    .map_err(|e| TransportError::Decode(e.to_string()))?;
                self.milestones
                    .write()
                    .await
                    .insert(created.title.to_lowercase(), created.number);
                info!(milestone = name, number = created.number, "milestone created");
                Ok(())
            }
            Err(TransportError::Status { status: 422, .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
