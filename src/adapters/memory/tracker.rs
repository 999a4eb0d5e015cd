use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::errors::TransportError;
use crate::domain::models::{
    Catalog, Comment, CommentId, IssueNumber, Mutation, RemoteIssue, StateTransition, UserId,
};
use crate::domain::ports::IssueTracker;
use crate::infrastructure::rate_limiter::RequestBudget;

/// Tracker operations, used to count calls and target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackerCall {
    CurrentUser,
    ListIssues,
    FetchCatalog,
    FetchIssue,
    FetchComments,
    ApplyMutation,
    PostComment,
    EnsureLabel,
    EnsureMilestone,
}

type FetchHook = Box<dyn FnOnce(&mut RemoteIssue) + Send>;

#[derive(Default)]
struct TrackerState {
    issues: BTreeMap<IssueNumber, RemoteIssue>,
    comments: BTreeMap<IssueNumber, Vec<Comment>>,
    catalog: Catalog,
    next_comment_id: CommentId,
    calls: HashMap<TrackerCall, usize>,
    failures: HashMap<TrackerCall, VecDeque<TransportError>>,
    issue_fetches: HashMap<IssueNumber, usize>,
    fetch_hooks: HashMap<(IssueNumber, usize), FetchHook>,
    mutations: Vec<(IssueNumber, Mutation)>,
}

/// Scriptable tracker held entirely in memory.
///
/// Comment ids are allocated from one counter so they increase across
/// issues, like the hosted trackers. Each call counts as one request
/// against the optional budget and the optional request timeout.
pub struct InMemoryTracker {
    login: UserId,
    state: Mutex<TrackerState>,
    latency: Duration,
    request_timeout: Option<Duration>,
    budget: Option<Arc<RequestBudget>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryTracker {
    /// Empty tracker authenticated as `login`, with no latency.
    pub fn new(login: impl Into<UserId>) -> Self {
        Self {
            login: login.into(),
            state: Mutex::new(TrackerState {
                next_comment_id: 100,
                ..TrackerState::default()
            }),
            latency: Duration::ZERO,
            request_timeout: None,
            budget: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail calls whose latency exceeds `timeout`, after waiting that long.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Take a token of `budget` before every call.
    #[must_use]
    pub fn with_budget(mut self, budget: Arc<RequestBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Account the tracker reports as the bot.
    pub fn login(&self) -> &str {
        &self.login
    }

    pub async fn set_catalog(&self, catalog: Catalog) {
        self.state.lock().await.catalog = catalog;
    }

    /// Create or replace an open issue with the given labels.
    pub async fn add_issue(&self, number: IssueNumber, title: &str, labels: &[&str]) {
        let issue = RemoteIssue {
            number,
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            milestone: None,
            assignee: None,
            title: title.to_string(),
            is_open: true,
            last_actor: None,
        };
        self.state.lock().await.issues.insert(number, issue);
    }

    /// Post a comment as `author`; returns its id.
    pub async fn comment(&self, issue: IssueNumber, author: &str, body: &str) -> CommentId {
        let mut state = self.state.lock().await;
        push_comment(&mut state, issue, author, body)
    }

    /// Change an issue outside of comment directives.
    pub async fn edit_issue<F>(&self, issue: IssueNumber, actor: Option<&str>, edit: F)
    where
        F: FnOnce(&mut RemoteIssue),
    {
        let mut state = self.state.lock().await;
        if let Some(remote) = state.issues.get_mut(&issue) {
            edit(remote);
            remote.last_actor = actor.map(str::to_string);
        }
    }

    /// Apply `edit` right before the `nth` (1-based) fetch of `issue` returns.
    pub async fn on_fetch<F>(&self, issue: IssueNumber, nth: usize, edit: F)
    where
        F: FnOnce(&mut RemoteIssue) + Send + 'static,
    {
        self.state
            .lock()
            .await
            .fetch_hooks
            .insert((issue, nth), Box::new(edit));
    }

    /// Make the next call of kind `call` fail with `error`.
    pub async fn fail_next(&self, call: TrackerCall, error: TransportError) {
        self.state
            .lock()
            .await
            .failures
            .entry(call)
            .or_default()
            .push_back(error);
    }

    pub async fn issue(&self, issue: IssueNumber) -> Option<RemoteIssue> {
        self.state.lock().await.issues.get(&issue).cloned()
    }

    pub async fn comments(&self, issue: IssueNumber) -> Vec<Comment> {
        self.state
            .lock()
            .await
            .comments
            .get(&issue)
            .cloned()
            .unwrap_or_default()
    }

    /// Comments on `issue` written by the tracker's own login.
    pub async fn own_comments(&self, issue: IssueNumber) -> Vec<Comment> {
        self.comments(issue)
            .await
            .into_iter()
            .filter(|c| c.author == self.login)
            .collect()
    }

    pub async fn calls(&self, call: TrackerCall) -> usize {
        self.state.lock().await.calls.get(&call).copied().unwrap_or(0)
    }

    /// Field mutations applied so far, in order.
    pub async fn mutations(&self) -> Vec<(IssueNumber, Mutation)> {
        self.state.lock().await.mutations.clone()
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: TrackerCall) -> Result<InFlight<'_>, TransportError> {
        if let Some(budget) = &self.budget {
            budget.acquire().await;
        }
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let timed_out = self.request_timeout.filter(|timeout| self.latency > *timeout);
        let wait = timed_out.unwrap_or(self.latency);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let mut state = self.state.lock().await;
        *state.calls.entry(call).or_default() += 1;
        if let Some(timeout) = timed_out {
            return Err(TransportError::Timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ));
        }
        if let Some(error) = state.failures.get_mut(&call).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        Ok(guard)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn push_comment(state: &mut TrackerState, issue: IssueNumber, author: &str, body: &str) -> CommentId {
    state.next_comment_id += 1;
    let id = state.next_comment_id;
    state.comments.entry(issue).or_default().push(Comment {
        id,
        author: author.to_string(),
        body: body.to_string(),
    });
    id
}

fn not_found(issue: IssueNumber) -> TransportError {
    TransportError::NotFound(format!("issue #{issue}"))
}

#[async_trait]
impl IssueTracker for InMemoryTracker {
    async fn current_user(&self) -> Result<UserId, TransportError> {
        let _call = self.enter(TrackerCall::CurrentUser).await?;
        Ok(self.login.clone())
    }

    async fn list_issues(&self) -> Result<Vec<IssueNumber>, TransportError> {
        let _call = self.enter(TrackerCall::ListIssues).await?;
        Ok(self.state.lock().await.issues.keys().copied().collect())
    }

    async fn fetch_catalog(&self) -> Result<Catalog, TransportError> {
        let _call = self.enter(TrackerCall::FetchCatalog).await?;
        Ok(self.state.lock().await.catalog.clone())
    }

    async fn fetch_issue(&self, issue: IssueNumber) -> Result<RemoteIssue, TransportError> {
        let _call = self.enter(TrackerCall::FetchIssue).await?;
        let mut state = self.state.lock().await;
        let count = {
            let count = state.issue_fetches.entry(issue).or_default();
            *count += 1;
            *count
        };
        let hook = state.fetch_hooks.remove(&(issue, count));
        let remote = state.issues.get_mut(&issue).ok_or_else(|| not_found(issue))?;
        if let Some(hook) = hook {
            hook(remote);
        }
        Ok(remote.clone())
    }

    async fn fetch_new_comments(
        &self,
        issue: IssueNumber,
        since: Option<CommentId>,
    ) -> Result<Vec<Comment>, TransportError> {
        let _call = self.enter(TrackerCall::FetchComments).await?;
        let state = self.state.lock().await;
        if !state.issues.contains_key(&issue) {
            return Err(not_found(issue));
        }
        Ok(state
            .comments
            .get(&issue)
            .map(|comments| {
                comments
                    .iter()
                    .filter(|c| since.is_none_or(|since| c.id > since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn apply_mutation(&self, issue: IssueNumber, mutation: &Mutation) -> Result<(), TransportError> {
        let _call = self.enter(TrackerCall::ApplyMutation).await?;
        let mut state = self.state.lock().await;
        let login = self.login.clone();
        let remote = state.issues.get_mut(&issue).ok_or_else(|| not_found(issue))?;

        for label in &mutation.remove_labels {
            remote.labels.remove(label);
        }
        remote.labels.extend(mutation.add_labels.iter().cloned());
        if let Some(milestone) = &mutation.milestone {
            remote.milestone = Some(milestone.clone());
        }
        if let Some(assignee) = &mutation.assignee {
            remote.assignee = Some(assignee.clone());
        }
        if let Some(title) = &mutation.title {
            remote.title = title.clone();
        }
        match mutation.transition {
            Some(StateTransition::Open) => remote.is_open = true,
            Some(StateTransition::Close) => remote.is_open = false,
            None => {}
        }
        remote.last_actor = Some(login);
        state.mutations.push((issue, mutation.fields_only()));
        Ok(())
    }

    async fn post_comment(&self, issue: IssueNumber, body: &str) -> Result<CommentId, TransportError> {
        let _call = self.enter(TrackerCall::PostComment).await?;
        let mut state = self.state.lock().await;
        if !state.issues.contains_key(&issue) {
            return Err(not_found(issue));
        }
        Ok(push_comment(&mut state, issue, &self.login, body))
    }

    async fn ensure_label(&self, name: &str) -> Result<(), TransportError> {
        let _call = self.enter(TrackerCall::EnsureLabel).await?;
        self.state.lock().await.catalog.labels.insert(name.to_string());
        Ok(())
    }

    async fn ensure_milestone(&self, name: &str) -> Result<(), TransportError> {
        let _call = self.enter(TrackerCall::EnsureMilestone).await?;
        self.state.lock().await.catalog.milestones.insert(name.to_string());
        Ok(())
    }
}
