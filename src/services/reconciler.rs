//! Reconciliation engine.
//!
//! Runs one pass over one issue: observe, plan, write, persist. The remote
//! write always happens before the snapshot is persisted, so a pass that
//! dies in between is repeated from the old snapshot and converges on the
//! same result. The paper trail marker keeps that repeat from posting a
//! second comment.
//!
//! Tracker calls are not raced against a timer here: adapters bound each
//! request once it holds its budget token, and a started write always runs
//! to completion.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::domain::errors::{ReconcileError, TransportError};
use crate::domain::models::{
    Catalog, Comment, IssueNumber, LifecycleConfig, Mutation, PassSummary, ReconcileOutcome,
    StateTransition, WorkerConfig,
};
use crate::domain::ports::{IssueTracker, SnapshotStore};

use super::issue_locks::IssueLocks;
use super::pass_planner::{PassInput, PassPlanner};
use super::paper_trail::PaperTrailMarker;

/// Runtime settings of the engine.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub bot_login: String,
    pub post_delay: Duration,
    pub catalog_ttl: Duration,
    pub dry_run: bool,
}

impl ReconcilerSettings {
    /// Settings for `bot_login` taken from the worker section.
    pub fn from_worker(bot_login: impl Into<String>, worker: &WorkerConfig) -> Self {
        Self {
            bot_login: bot_login.into(),
            post_delay: Duration::from_millis(worker.post_delay_ms),
            catalog_ttl: Duration::from_secs(worker.catalog_ttl_secs),
            dry_run: worker.dry_run,
        }
    }
}

struct CachedCatalog {
    fetched_at: Instant,
    catalog: Arc<Catalog>,
}

/// Per-issue reconciliation against a tracker and a snapshot store.
pub struct Reconciler {
    tracker: Arc<dyn IssueTracker>,
    store: Arc<dyn SnapshotStore>,
    lifecycle: LifecycleConfig,
    planner: PassPlanner,
    locks: IssueLocks,
    catalog: RwLock<Option<CachedCatalog>>,
    settings: ReconcilerSettings,
}

impl Reconciler {
    /// Engine over `tracker` and `store` applying `lifecycle` rules.
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        store: Arc<dyn SnapshotStore>,
        lifecycle: LifecycleConfig,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            tracker,
            store,
            planner: PassPlanner::new(lifecycle.clone(), &settings.bot_login),
            lifecycle,
            locks: IssueLocks::new(),
            catalog: RwLock::new(None),
            settings,
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Reconcile `issue` once. Idempotent.
    pub async fn reconcile(&self, issue: IssueNumber) -> ReconcileOutcome {
        self.reconcile_with_cancel(issue, &CancellationToken::new())
            .await
    }

    pub async fn reconcile_with_cancel(
        &self,
        issue: IssueNumber,
        cancel: &CancellationToken,
    ) -> ReconcileOutcome {
        match self.run_pass(issue, cancel).await {
            Ok(summary) => ReconcileOutcome::Synced(summary),
            Err(ReconcileError::Cancelled) => {
                info!(issue, "reconciliation cancelled before remote write");
                ReconcileOutcome::Cancelled
            }
            Err(err) => {
                warn!(issue, kind = err.kind(), error = %err, "reconciliation failed");
                ReconcileOutcome::Failed {
                    reason: err.to_string(),
                    conflict: !err.counts_as_failure(),
                }
            }
        }
    }

    /// One pass over `issue` while holding its lock.
    pub async fn run_pass(
        &self,
        issue: IssueNumber,
        cancel: &CancellationToken,
    ) -> Result<PassSummary, ReconcileError> {
        let span = tracing::info_span!("reconcile", issue, pass_id = %Uuid::new_v4());
        async {
            let _guard = self.locks.acquire(issue).await;
            self.pass(issue, cancel).await
        }
        .instrument(span)
        .await
    }

    async fn pass(
        &self,
        issue: IssueNumber,
        cancel: &CancellationToken,
    ) -> Result<PassSummary, ReconcileError> {
        checkpoint(cancel)?;

        // (a) observe
        let previous = self.store.load(issue).await?;
        let catalog = self.catalog().await?;
        checkpoint(cancel)?;
        let remote = self.call(self.tracker.fetch_issue(issue)).await?;
        let since = previous.as_ref().and_then(|s| s.last_processed_comment_id);
        let comments = self
            .call(self.tracker.fetch_new_comments(issue, since))
            .await?;
        checkpoint(cancel)?;

        let input = PassInput {
            issue,
            previous: previous.as_ref(),
            remote: &remote,
            comments: &comments,
            catalog: &catalog,
        };

        if self.planner.is_adoption(&input) {
            let state = self.planner.adopt(&input);
            info!(
                issue,
                comments = comments.len(),
                "adopting issue already handled by the bot"
            );
            if !self.settings.dry_run {
                self.store.save(&state, None).await?;
            }
            return Ok(PassSummary {
                adopted: true,
                dry_run: self.settings.dry_run,
                ..PassSummary::default()
            });
        }

        // (b)-(f) plan
        let plan = self.planner.plan(&input);
        for rejection in &plan.rejected {
            warn!(
                issue,
                kind = rejection.kind.as_str(),
                author = %rejection.directive.author,
                directive = %rejection.directive.source,
                reason = %rejection.reason,
                "directive rejected"
            );
        }

        let mut summary = PassSummary {
            changes: plan.changes.clone(),
            rejected: plan.rejected.clone(),
            mutation: plan.mutation.clone(),
            accepted: plan.accepted,
            dry_run: self.settings.dry_run,
            ..PassSummary::default()
        };

        if self.settings.dry_run {
            info!(
                issue,
                mutation = ?plan.mutation,
                changes = plan.changes.len(),
                "dry run: mutation computed, nothing written"
            );
            return Ok(summary);
        }

        if !plan.needs_persist(previous.as_ref()) {
            debug!(issue, "issue already in sync");
            return Ok(summary);
        }

        let mut mutation = plan.mutation.clone();
        if let Some(marker) = &plan.marker {
            if self.already_posted(marker, &comments) {
                info!(issue, fingerprint = %marker.fingerprint(), "paper trail already posted");
                mutation.comment = None;
                summary.deduplicated = true;
            }
        }

        if !mutation.is_empty() {
            // Last point at which the pass may be abandoned
            checkpoint(cancel)?;
            let latest = self.call(self.tracker.fetch_issue(issue)).await?;
            if let Some(detail) = remote.describe_drift(&latest) {
                return Err(ReconcileError::Conflict { issue, detail });
            }

            // (g) write; never cancelled once started
            let fields = mutation.fields_only();
            if comment_first(&mutation, previous.is_none()) {
                self.post_paper_trail(issue, mutation.comment.as_deref()).await?;
                self.apply_fields(issue, &fields).await?;
            } else {
                self.apply_fields(issue, &fields).await?;
                self.post_paper_trail(issue, mutation.comment.as_deref()).await?;
            }
        }

        // (h) persist
        let expected = previous.as_ref().map(|p| p.revision);
        self.store.save(&plan.next, expected).await?;
        info!(
            issue,
            revision = plan.next.revision,
            changes = plan.changes.len(),
            rejected = plan.rejected.len(),
            "issue synced"
        );

        summary.mutation = mutation;
        Ok(summary)
    }

    fn already_posted(&self, marker: &PaperTrailMarker, comments: &[Comment]) -> bool {
        comments
            .iter()
            .filter(|c| self.planner.parser().is_bot(&c.author))
            .filter_map(|c| PaperTrailMarker::parse(&c.body))
            .any(|posted| posted.same_pass(marker))
    }

    async fn apply_fields(
        &self,
        issue: IssueNumber,
        fields: &Mutation,
    ) -> Result<(), ReconcileError> {
        if fields.has_field_writes() {
            self.call(self.tracker.apply_mutation(issue, fields)).await?;
        }
        Ok(())
    }

    async fn post_paper_trail(&self, issue: IssueNumber, body: Option<&str>) -> Result<(), ReconcileError> {
        let Some(body) = body else {
            return Ok(());
        };
        let comment_id = self.call(self.tracker.post_comment(issue, body)).await?;
        debug!(issue, comment_id, "paper trail posted");
        if !self.settings.post_delay.is_zero() {
            tokio::time::sleep(self.settings.post_delay).await;
        }
        Ok(())
    }

    /// Tracker catalog, refetched once older than the configured TTL.
    pub async fn catalog(&self) -> Result<Arc<Catalog>, ReconcileError> {
        {
            let cached = self.catalog.read().await;
            if let Some(cached) = cached.as_ref() {
                if cached.fetched_at.elapsed() < self.settings.catalog_ttl {
                    return Ok(Arc::clone(&cached.catalog));
                }
            }
        }
        self.refresh_catalog().await
    }

    pub async fn refresh_catalog(&self) -> Result<Arc<Catalog>, ReconcileError> {
        let catalog = Arc::new(self.call(self.tracker.fetch_catalog()).await?);
        debug!(
            labels = catalog.labels.len(),
            milestones = catalog.milestones.len(),
            collaborators = catalog.collaborators.len(),
            "catalog refreshed"
        );
        *self.catalog.write().await = Some(CachedCatalog {
            fetched_at: Instant::now(),
            catalog: Arc::clone(&catalog),
        });
        Ok(catalog)
    }

    /// Issues listed by the tracker.
    pub async fn list_issues(&self) -> Result<Vec<IssueNumber>, ReconcileError> {
        self.call(self.tracker.list_issues()).await
    }

    /// Create referenced labels and the default milestone when missing.
    pub async fn bootstrap(&self) -> Result<(), ReconcileError> {
        let catalog = self.refresh_catalog().await?;
        let mut created = 0usize;
        for label in self.lifecycle.referenced_labels() {
            if catalog.resolve_label(&label).is_none() {
                if self.settings.dry_run {
                    info!(label = %label, "dry run: would create label");
                } else {
                    self.call(self.tracker.ensure_label(&label)).await?;
                    created += 1;
                }
            }
        }
        if let Some(milestone) = &self.lifecycle.defaults.milestone {
            if catalog.resolve_milestone(milestone).is_none() {
                if self.settings.dry_run {
                    info!(milestone = %milestone, "dry run: would create milestone");
                } else {
                    self.call(self.tracker.ensure_milestone(milestone)).await?;
                    created += 1;
                }
            }
        }
        if created > 0 {
            info!(created, "bootstrapped missing labels and milestones");
            self.refresh_catalog().await?;
        }
        Ok(())
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        fut.await.map_err(ReconcileError::Transport)
    }
}

/// Whether the paper trail goes out before the field writes.
///
/// Closing passes and first passes comment first, so a repeat after a
/// crash finds the marker and only finishes the field writes. A reopen is
/// written before the comment that explains it.
fn comment_first(mutation: &Mutation, first_pass: bool) -> bool {
    mutation.closes() || (first_pass && mutation.transition != Some(StateTransition::Open))
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), ReconcileError> {
    if cancel.is_cancelled() {
        Err(ReconcileError::Cancelled)
    } else {
        Ok(())
    }
}
