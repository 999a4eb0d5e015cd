//! Domain errors for the issue lifecycle reconciler.

use thiserror::Error;

use super::models::IssueNumber;

/// Domain-level errors raised by stores and model validation.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Issue not found: #{0}")]
    IssueNotFound(IssueNumber),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Failures reported by an issue tracker transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Tracker call timed out after {0}ms")]
    Timeout(u64),

    #[error("Tracker rate limit exceeded")]
    RateLimited,

    #[error("Tracker returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Tracker resource not found: {0}")]
    NotFound(String),

    #[error("Tracker rejected a stale write: {0}")]
    Conflict(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed tracker response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited | Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::NotFound(_) | Self::Conflict(_) | Self::Decode(_) => false,
        }
    }
}

/// Errors that abort a reconciliation pass.
///
/// Validation and permission problems never show up here: they are
/// recovered locally as [`DirectiveRejection`](super::models::DirectiveRejection)s
/// and reported in the paper trail.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote state of issue #{issue} changed during the pass: {detail}")]
    Conflict { issue: IssueNumber, detail: String },

    #[error("Snapshot store error: {0}")]
    Store(DomainError),

    #[error("Pass cancelled before remote write")]
    Cancelled,
}

impl From<DomainError> for ReconcileError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ConcurrencyConflict { entity, id } => {
                let issue = id.parse().unwrap_or_default();
                ReconcileError::Conflict {
                    issue,
                    detail: format!("{entity} {id} was persisted by another writer"),
                }
            }
            other => ReconcileError::Store(other),
        }
    }
}

impl ReconcileError {
    /// Short machine-friendly label used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Conflict { .. } => "conflict",
            Self::Store(_) => "store",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the failure should count against the issue's retry budget.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_transience() {
        assert!(TransportError::Timeout(100).is_transient());
        assert!(TransportError::RateLimited.is_transient());
        assert!(TransportError::Status { status: 502, message: String::new() }.is_transient());
        assert!(!TransportError::Status { status: 422, message: String::new() }.is_transient());
        assert!(!TransportError::NotFound("x".into()).is_transient());
    }

    #[test]
    fn test_store_conflict_maps_to_reconcile_conflict() {
        let err: ReconcileError = DomainError::ConcurrencyConflict {
            entity: "issue snapshot".to_string(),
            id: "42".to_string(),
        }
        .into();

        match err {
            ReconcileError::Conflict { issue, .. } => assert_eq!(issue, 42),
            other => panic!("Expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_cancellation_does_not_count_as_failure() {
        assert!(!ReconcileError::Cancelled.counts_as_failure());
        assert!(ReconcileError::Transport(TransportError::RateLimited).counts_as_failure());
    }
}
