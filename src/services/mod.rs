//! Services: parsing, policy, planning and the reconciliation engine.

pub mod command_parser;
pub mod issue_locks;
pub mod label_policy;
pub mod paper_trail;
pub mod pass_planner;
pub mod reconcile_pool;
pub mod reconciler;
pub mod retry_tracker;
pub mod vote_tally;

pub use command_parser::CommandParser;
pub use issue_locks::{IssueGuard, IssueLocks};
pub use label_policy::{ImplicitRemoval, LabelOp, LabelPolicy, LabelRequest, PolicyOutcome};
pub use paper_trail::{PaperTrailMarker, PaperTrailRenderer};
pub use pass_planner::{PassInput, PassPlan, PassPlanner};
pub use reconcile_pool::ReconcilePool;
pub use reconciler::{Reconciler, ReconcilerSettings};
pub use retry_tracker::{RetryDecision, RetryEntry, RetryTracker};
