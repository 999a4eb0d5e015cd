//! Domain models for issue lifecycle automation.

pub mod catalog;
pub mod config;
pub mod directive;
pub mod issue;
pub mod lifecycle;
pub mod mutation;
pub mod reconcile;

pub use catalog::Catalog;
pub use config::{
    Config, DatabaseConfig, HttpRetryConfig, LoggingConfig, RateLimitConfig, RetryConfig,
    TrackerConfig, WorkerConfig,
};
pub use directive::{Directive, DirectiveKind, DirectiveRejection, RejectionKind};
pub use issue::{Comment, CommentId, IssueNumber, IssueState, RemoteIssue, UserId};
pub use lifecycle::{
    AuthorPermissions, IssueDefaults, LifecycleConfig, PermissionConfig, PermissionScope,
};
pub use mutation::{Mutation, StateTransition};
pub use reconcile::{
    Attribution, ChangeKind, CycleReport, FieldChange, IssueReport, PassSummary,
    ReconcileOutcome, ReconcileStatus,
};
