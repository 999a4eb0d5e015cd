//! SQLite implementation of the SnapshotStore.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{IssueNumber, IssueState};
use crate::domain::ports::SnapshotStore;

use super::{parse_datetime, parse_json_or_default};

pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    /// Store over a migrated `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_sql_int(value: u64, field: &str) -> DomainResult<i64> {
    i64::try_from(value)
        .map_err(|_| DomainError::ValidationFailed(format!("{field} {value} exceeds the storable range")))
}

fn from_sql_int(value: i64, field: &str) -> DomainResult<u64> {
    u64::try_from(value)
        .map_err(|_| DomainError::SerializationError(format!("negative {field} in snapshot row: {value}")))
}

fn conflict(issue: IssueNumber) -> DomainError {
    DomainError::ConcurrencyConflict {
        entity: "issue snapshot".to_string(),
        id: issue.to_string(),
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load(&self, issue: IssueNumber) -> DomainResult<Option<IssueState>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            "SELECT * FROM issue_snapshots WHERE issue_number = ?"
        )
        .bind(to_sql_int(issue, "issue number")?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn save(&self, state: &IssueState, expected_revision: Option<u64>) -> DomainResult<()> {
        let wanted = expected_revision.map_or(1, |r| r + 1);
        if state.revision != wanted {
            return Err(DomainError::ValidationFailed(format!(
                "snapshot for #{} carries revision {} but {} was expected",
                state.issue, state.revision, wanted
            )));
        }

        let issue = to_sql_int(state.issue, "issue number")?;
        let labels = serde_json::to_string(&state.labels)?;
        let votes = serde_json::to_string(&state.votes)?;
        let last_processed = state
            .last_processed_comment_id
            .map(|id| to_sql_int(id, "comment id"))
            .transpose()?;
        let revision = to_sql_int(state.revision, "revision")?;

        let result = match expected_revision {
            None => {
                sqlx::query(
                    r#"INSERT INTO issue_snapshots (issue_number, labels, milestone, assignee, title, is_open, votes, last_processed_comment_id, revision, updated_at)
                       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                       ON CONFLICT(issue_number) DO NOTHING"#
                )
                .bind(issue)
                .bind(&labels)
                .bind(&state.milestone)
                .bind(&state.assignee)
                .bind(&state.title)
                .bind(state.is_open)
                .bind(&votes)
                .bind(last_processed)
                .bind(revision)
                .bind(state.updated_at.to_rfc3339())
                .execute(&self.pool)
                .await?
            }
            Some(expected) => {
                sqlx::query(
                    r#"UPDATE issue_snapshots SET labels = ?, milestone = ?, assignee = ?, title = ?, is_open = ?, votes = ?,
                       last_processed_comment_id = ?, revision = ?, updated_at = ?
                       WHERE issue_number = ? AND revision = ?"#
                )
                .bind(&labels)
                .bind(&state.milestone)
                .bind(&state.assignee)
                .bind(&state.title)
                .bind(state.is_open)
                .bind(&votes)
                .bind(last_processed)
                .bind(revision)
                .bind(state.updated_at.to_rfc3339())
                .bind(issue)
                .bind(to_sql_int(expected, "revision")?)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(conflict(state.issue));
        }

        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<IssueState>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            "SELECT * FROM issue_snapshots ORDER BY issue_number"
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    issue_number: i64,
    labels: Option<String>,
    milestone: Option<String>,
    assignee: Option<String>,
    title: String,
    is_open: bool,
    votes: Option<String>,
    last_processed_comment_id: Option<i64>,
    revision: i64,
    updated_at: String,
}

impl TryFrom<SnapshotRow> for IssueState {
    type Error = DomainError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(IssueState {
            issue: from_sql_int(row.issue_number, "issue number")?,
            labels: parse_json_or_default(row.labels)?,
            milestone: row.milestone,
            assignee: row.assignee,
            title: row.title,
            is_open: row.is_open,
            votes: parse_json_or_default(row.votes)?,
            last_processed_comment_id: row
                .last_processed_comment_id
                .map(|id| from_sql_int(id, "comment id"))
                .transpose()?,
            revision: from_sql_int(row.revision, "revision")?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
