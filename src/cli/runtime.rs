//! Wiring of adapters and services for the CLI commands.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::adapters::github::GitHubTracker;
use crate::adapters::sqlite::{initialize_database, SqliteSnapshotStore};
use crate::domain::models::Config;
use crate::domain::ports::{IssueTracker, LogOperatorChannel, SnapshotStore};
use crate::infrastructure::rate_limiter::RequestBudget;
use crate::infrastructure::retry::RetryPolicy;
use crate::services::{ReconcilePool, Reconciler, ReconcilerSettings, RetryTracker};

/// Everything a reconciling command needs.
pub struct Runtime {
    pub config: Config,
    pub reconciler: Arc<Reconciler>,
    pub pool: ReconcilePool,
}

impl Runtime {
    pub async fn build(config: Config) -> Result<Self> {
        if config.tracker.owner.is_empty() || config.tracker.repo.is_empty() {
            bail!("tracker.owner and tracker.repo must be configured (.issue-lifecycle/config.yaml or ISSUE_LIFECYCLE_TRACKER__OWNER/REPO)");
        }
        if config.tracker.token.is_empty() {
            info!("no tracker token configured, requests are unauthenticated");
        }

        let call_timeout = Duration::from_millis(config.worker.call_timeout_ms);
        let budget = Arc::new(RequestBudget::from_config(&config.rate_limit));
        let github = GitHubTracker::new(&config.tracker, call_timeout)
            .context("Failed to build GitHub client")?
            .with_budget(budget);
        let tracker: Arc<dyn IssueTracker> = Arc::new(github);

        let bot_login = match &config.tracker.bot_login {
            Some(login) => login.clone(),
            None => tracker
                .current_user()
                .await
                .context("Failed to resolve the bot login from the tracker token")?,
        };

        let store = open_store(&config).await?;
        let settings = ReconcilerSettings::from_worker(bot_login.clone(), &config.worker);
        let reconciler = Arc::new(Reconciler::new(
            tracker,
            store,
            config.lifecycle.clone(),
            settings,
        ));

        let retries = Arc::new(RetryTracker::new(RetryPolicy::from(&config.retry)));
        let pool = ReconcilePool::new(
            Arc::clone(&reconciler),
            retries,
            Arc::new(LogOperatorChannel),
            config.worker.max_workers,
        );

        info!(
            owner = %config.tracker.owner,
            repo = %config.tracker.repo,
            bot = %bot_login,
            workers = config.worker.max_workers,
            dry_run = config.worker.dry_run,
            "runtime ready"
        );

        Ok(Self { config, reconciler, pool })
    }
}

/// Open and migrate the SQLite database named by the config.
pub async fn open_store(config: &Config) -> Result<Arc<dyn SnapshotStore>> {
    let pool = initialize_database(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open snapshot database at {}", config.database.path))?;
    Ok(Arc::new(SqliteSnapshotStore::new(pool)))
}
