//! Static lifecycle rules: defaults, label policy and permissions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::catalog::Catalog;

/// Values applied to issues that arrive without any triage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDefaults {
    #[serde(default = "default_new_labels")]
    pub labels: Vec<String>,

    #[serde(default = "default_milestone")]
    pub milestone: Option<String>,

    #[serde(default)]
    pub assignee: Option<String>,
}

impl Default for IssueDefaults {
    fn default() -> Self {
        Self {
            labels: default_new_labels(),
            milestone: default_milestone(),
            assignee: None,
        }
    }
}

/// Capability granted to a non-collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionScope {
    Labels,
    Milestone,
    Assignee,
}

impl PermissionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Labels => "labels",
            Self::Milestone => "milestone",
            Self::Assignee => "assignee",
        }
    }
}

/// Who may use comment commands beyond repository collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionConfig {
    /// Scopes granted per user login
    #[serde(default)]
    pub users: BTreeMap<String, Vec<PermissionScope>>,

    /// Per-label allow lists: label name to user logins
    #[serde(default)]
    pub labels: BTreeMap<String, Vec<String>>,
}

/// Complete lifecycle rule set, loaded once per process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default)]
    pub defaults: IssueDefaults,

    /// Groups of state labels of which at most one may be present
    #[serde(default = "default_exclusive_groups")]
    pub exclusive_groups: Vec<Vec<String>>,

    /// When the key label is present, the listed labels are removed
    #[serde(default = "default_auto_remove")]
    pub auto_remove: BTreeMap<String, Vec<String>>,

    /// Adding one of these closes the issue
    #[serde(default = "default_state_labels")]
    pub closing_labels: Vec<String>,

    /// Removing one of these reopens the issue
    #[serde(default = "default_state_labels")]
    pub reopening_labels: Vec<String>,

    #[serde(default)]
    pub permissions: PermissionConfig,

    /// Text used by the "What's next?" line, keyed by label
    #[serde(default = "default_explanations")]
    pub explanations: BTreeMap<String, String>,

    /// Labels whose explanation, when present, is the only one given
    #[serde(default = "default_final_word_labels")]
    pub final_word_labels: Vec<String>,

    /// Label meaning the change awaits a committer
    #[serde(default = "default_committer_label")]
    pub committer_label: Option<String>,

    /// Prefix of labels that describe outstanding work
    #[serde(default = "default_needs_prefix")]
    pub needs_prefix: String,

    /// Comments containing this keyword carry no directives
    #[serde(default = "default_ignore_keyword")]
    pub ignore_keyword: Option<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            defaults: IssueDefaults::default(),
            exclusive_groups: default_exclusive_groups(),
            auto_remove: default_auto_remove(),
            closing_labels: default_state_labels(),
            reopening_labels: default_state_labels(),
            permissions: PermissionConfig::default(),
            explanations: default_explanations(),
            final_word_labels: default_final_word_labels(),
            committer_label: default_committer_label(),
            needs_prefix: default_needs_prefix(),
            ignore_keyword: default_ignore_keyword(),
        }
    }
}

impl LifecycleConfig {
    /// Every label the rules refer to, for start-up bootstrap.
    pub fn referenced_labels(&self) -> BTreeSet<String> {
        let mut labels: BTreeSet<String> = self.defaults.labels.iter().cloned().collect();
        labels.extend(self.exclusive_groups.iter().flatten().cloned());
        for (trigger, targets) in &self.auto_remove {
            labels.insert(trigger.clone());
            labels.extend(targets.iter().cloned());
        }
        labels.extend(self.closing_labels.iter().cloned());
        labels.extend(self.reopening_labels.iter().cloned());
        labels
    }

    /// Resolve what `author` may do.
    pub fn permissions_for(&self, author: &str, catalog: &Catalog) -> AuthorPermissions {
        let login = author.to_lowercase();
        let scopes = self
            .permissions
            .users
            .iter()
            .find(|(user, _)| user.to_lowercase() == login)
            .map(|(_, scopes)| scopes.iter().copied().collect())
            .unwrap_or_default();
        let labels = self
            .permissions
            .labels
            .iter()
            .filter(|(_, users)| users.iter().any(|u| u.to_lowercase() == login))
            .map(|(label, _)| label.to_lowercase())
            .collect();

        AuthorPermissions {
            collaborator: catalog.is_collaborator(author),
            scopes,
            labels,
        }
    }
}

/// Effective permissions of one comment author.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorPermissions {
    pub collaborator: bool,
    pub scopes: BTreeSet<PermissionScope>,
    /// Lower-cased labels the author may add or remove individually
    pub labels: BTreeSet<String>,
}

impl AuthorPermissions {
    /// Unrestricted permissions, as held by collaborators.
    pub fn collaborator() -> Self {
        Self {
            collaborator: true,
            ..Self::default()
        }
    }

    pub fn has_scope(&self, scope: PermissionScope) -> bool {
        self.collaborator || self.scopes.contains(&scope)
    }

    pub fn may_change_label(&self, label: &str) -> bool {
        self.has_scope(PermissionScope::Labels) || self.labels.contains(&label.to_lowercase())
    }
}

fn default_new_labels() -> Vec<String> {
    vec!["#new".to_string()]
}

#[allow(clippy::unnecessary_wraps)]
fn default_milestone() -> Option<String> {
    Some("Someday".to_string())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn default_exclusive_groups() -> Vec<Vec<String>> {
    vec![strings(&[
        "#new",
        "#acknowledged",
        "#accepted",
        "#wont-fix",
        "#works-for-me",
        "#fixed",
    ])]
}

const OUTSTANDING_WORK: &[&str] = &[
    "#needs-confirmation",
    "#needs-docs",
    "#needs-improvement",
    "#needs-info",
    "#needs-patch",
    "#needs-reduction",
    "#needs-review",
    "#needs-unit-test",
];

fn default_auto_remove() -> BTreeMap<String, Vec<String>> {
    let mut finished = strings(OUTSTANDING_WORK);
    finished.push("#ready-to-commit".to_string());
    let mut duplicate = vec!["#new".to_string()];
    duplicate.extend(finished.iter().cloned());

    BTreeMap::from([
        (
            "#acknowledged".to_string(),
            strings(&["#needs-confirmation", "#needs-info"]),
        ),
        (
            "#accepted".to_string(),
            strings(&["#needs-confirmation", "#needs-info", "#needs-review"]),
        ),
        ("#ready-to-commit".to_string(), strings(OUTSTANDING_WORK)),
        ("#fixed".to_string(), finished.clone()),
        ("#wont-fix".to_string(), finished),
        ("#duplicate".to_string(), duplicate),
    ])
}

fn default_state_labels() -> Vec<String> {
    strings(&["#wont-fix", "#works-for-me", "#fixed", "#duplicate"])
}

fn default_final_word_labels() -> Vec<String> {
    strings(&["#fixed", "#duplicate", "#wont-fix", "#works-for-me"])
}

#[allow(clippy::unnecessary_wraps)]
fn default_committer_label() -> Option<String> {
    Some("#ready-to-commit".to_string())
}

fn default_needs_prefix() -> String {
    "#needs".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_ignore_keyword() -> Option<String> {
    Some("#lifecycle-ignore".to_string())
}

fn default_explanations() -> BTreeMap<String, String> {
    [
        ("#needs-confirmation", "This issue needs a volunteer to independently reproduce the issue."),
        ("#needs-info", "Additional information should be added as a comment to this issue."),
        ("#needs-review", "This issue is pending an architectural or implementation design decision and should be discussed or voted on."),
        ("#needs-docs", "Additional documentation patches should be submitted for this issue."),
        ("#needs-improvement", "The code for this issue has problems with formatting, has bugs, or has non-optimal logic or algorithms. It should be improved upon."),
        ("#needs-patch", "This issue needs a volunteer to write and submit code to address it."),
        ("#needs-reduction", "A minimal test app should be created which demonstrates the concern of this issue in isolation."),
        ("#needs-unit-test", "This issue needs a volunteer to write and submit one or more unit tests exercising the changes and/or the relevant parts of the original problem."),
        ("#duplicate", "This issue duplicates another existing issue. Refer to the duplicate issue for further information."),
        ("#fixed", "This issue is considered successfully resolved."),
        ("#wont-fix", "A reviewer or core team member has decided against acting upon this issue."),
        ("#works-for-me", "Attempts to reproduce the problem described by this issue have failed to reveal any erroneous situation."),
        ("#new", "A reviewer should examine this issue."),
        ("#accepted", "This issue has been confirmed but needs further review."),
    ]
    .into_iter()
    .map(|(label, text)| (label.to_string(), text.to_string()))
    .collect()
}
