//! Paper trail comment rendering.
//!
//! A paper trail summarises the current state of an issue, lists what
//! changed in the pass with attribution, reports rejected directives and
//! ends with an invisible marker that identifies the pass. The marker lets
//! a retried pass recognise a comment it already posted.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt::{self, Write as _};
use std::sync::LazyLock;

use crate::domain::models::{
    Attribution, ChangeKind, DirectiveRejection, FieldChange, IssueNumber, IssueState,
    LifecycleConfig,
};

use super::vote_tally::tally;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!-- issue-lifecycle:(\d+)\.(\d+)\.([0-9a-f]{12}) -->").expect("marker pattern")
});

/// Invisible marker identifying the pass that posted a paper trail.
///
/// A pass is identified by the issue and the snapshot revision it started
/// from; the digest covers the rendered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperTrailMarker {
    pub issue: IssueNumber,
    pub revision: u64,
    pub digest: String,
}

impl PaperTrailMarker {
    pub fn for_body(issue: IssueNumber, revision: u64, body: &str) -> Self {
        let digest = Sha256::digest(format!("{issue}:{revision}:{body}").as_bytes());
        let mut digest = format!("{digest:x}");
        digest.truncate(12);
        Self {
            issue,
            revision,
            digest,
        }
    }

    /// Marker carried by a comment, if it is a paper trail.
    pub fn parse(body: &str) -> Option<Self> {
        let caps = MARKER.captures(body)?;
        Some(Self {
            issue: caps[1].parse().ok()?,
            revision: caps[2].parse().ok()?,
            digest: caps[3].to_string(),
        })
    }

    /// Whether both markers were written by a pass over the same snapshot.
    pub fn same_pass(&self, other: &Self) -> bool {
        self.issue == other.issue && self.revision == other.revision
    }

    pub fn fingerprint(&self) -> String {
        format!("{}.{}.{}", self.issue, self.revision, self.digest)
    }
}

impl fmt::Display for PaperTrailMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<!-- issue-lifecycle:{} -->", self.fingerprint())
    }
}

/// Renders paper trail comments from the lifecycle rules.
#[derive(Debug, Clone)]
pub struct PaperTrailRenderer {
    config: LifecycleConfig,
}

impl PaperTrailRenderer {
    /// Renderer using the label descriptions of `config`.
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    /// Render the comment body, marker included.
    ///
    /// `base_revision` is the revision of the snapshot the pass started
    /// from; it ties the marker to this pass.
    pub fn render(
        &self,
        state: &IssueState,
        changes: &[FieldChange],
        rejected: &[DirectiveRejection],
        base_revision: u64,
    ) -> String {
        let mut body = self.summary(state);

        if !changes.is_empty() {
            body.push_str("\n\n");
            for change in changes {
                let _ = writeln!(body, "- {}", describe_change(change));
            }
            body.truncate(body.trim_end().len());
        }

        if !rejected.is_empty() {
            body.push_str("\n\n**Ignored commands:**\n");
            for rejection in rejected {
                let _ = writeln!(body, "- {rejection}");
            }
            body.truncate(body.trim_end().len());
        }

        let marker = PaperTrailMarker::for_body(state.issue, base_revision, &body);
        format!("{body}\n\n{marker}")
    }

    /// One-paragraph state summary ending with "What's next?".
    pub fn summary(&self, state: &IssueState) -> String {
        let mut out = String::new();
        if let Some(assignee) = &state.assignee {
            let _ = write!(out, "**Assignee:** @{assignee}.  ");
        }
        if let Some(milestone) = &state.milestone {
            let _ = write!(out, "**Milestone:** {milestone}.  ");
        }
        if !state.votes.is_empty() {
            let votes = tally(&state.votes);
            let plural = if votes == 1 { "" } else { "s" };
            let _ = write!(out, "**Vote{plural}:** {votes}.  ");
        }
        if !state.labels.is_empty() {
            let plural = if state.labels.len() == 1 { "" } else { "s" };
            let joined: Vec<&str> = state.labels.iter().map(String::as_str).collect();
            let _ = write!(out, "**Label{plural}:** {}.  ", joined.join(", "));
        }
        let _ = write!(
            out,
            "**What's next?** {}",
            self.whats_next(state.assignee.as_deref(), &state.labels)
        );
        out.trim_end().to_string()
    }

    /// Explain what the issue is waiting for.
    pub fn whats_next<'a, I>(&self, assignee: Option<&str>, labels: I) -> String
    where
        I: IntoIterator<Item = &'a String> + Copy,
    {
        let has = |wanted: &str| {
            labels
                .into_iter()
                .any(|label| label.eq_ignore_ascii_case(wanted))
        };

        for final_label in &self.config.final_word_labels {
            if has(final_label) {
                if let Some(text) = self.explanation(final_label) {
                    return text.to_string();
                }
            }
        }

        if let Some(committer_label) = &self.config.committer_label {
            if has(committer_label) {
                let who = assignee.map_or_else(
                    || "a member of the core team".to_string(),
                    |login| format!("@{login}"),
                );
                return format!("The changes for this issue are ready to be committed by {who}.");
            }
        }

        let prefix = self.config.needs_prefix.to_lowercase();
        let needs: Vec<&str> = labels
            .into_iter()
            .filter(|label| label.to_lowercase().starts_with(&prefix))
            .filter_map(|label| self.explanation(label))
            .collect();
        match needs.as_slice() {
            [] => "A reviewer should examine this issue.".to_string(),
            [only] => (*only).to_string(),
            many => format!("\n\n * {}", many.join("\n * ")),
        }
    }

    fn explanation(&self, label: &str) -> Option<&str> {
        self.config
            .explanations
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(label))
            .map(|(_, text)| text.as_str())
    }
}

fn attribution(attribution: &Attribution) -> String {
    match attribution {
        Attribution::User { login } => format!("by @{login}"),
        Attribution::Implicit { cause } => format!("due to `{cause}`"),
        Attribution::Defaults => "by default".to_string(),
        Attribution::External { actor: Some(actor) } => format!("by @{actor}"),
        Attribution::External { actor: None } => "externally".to_string(),
        Attribution::Votes => "by vote".to_string(),
    }
}

fn quoted(value: Option<&String>) -> String {
    value.map_or_else(|| "none".to_string(), |v| format!("`{v}`"))
}

fn signed(value: i64) -> String {
    if value > 0 {
        format!("+{value}")
    } else {
        value.to_string()
    }
}

fn describe_change(change: &FieldChange) -> String {
    let by = attribution(&change.attribution);
    match &change.kind {
        ChangeKind::LabelAdded { label } => format!("Label `{label}` added {by}."),
        ChangeKind::LabelRemoved { label } => format!("Label `{label}` removed {by}."),
        ChangeKind::Milestone { from, to } => format!(
            "Milestone changed from {} to {} {by}.",
            quoted(from.as_ref()),
            quoted(to.as_ref())
        ),
        ChangeKind::Assignee { from, to } => format!(
            "Assignee changed from {} to {} {by}.",
            quoted(from.as_ref()),
            quoted(to.as_ref())
        ),
        ChangeKind::Opened => format!("Issue reopened {by}."),
        ChangeKind::Closed => format!("Issue closed {by}."),
        ChangeKind::Tally { from, to } => {
            format!("Vote tally changed from {} to {} {by}.", signed(*from), signed(*to))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};

    fn state(labels: &[&str]) -> IssueState {
        IssueState {
            issue: 12,
            labels: labels.iter().map(|s| (*s).to_string()).collect(),
            milestone: None,
            assignee: None,
            title: "Title".to_string(),
            is_open: true,
            votes: BTreeMap::new(),
            last_processed_comment_id: None,
            revision: 1,
            updated_at: Utc::now(),
        }
    }

    fn renderer() -> PaperTrailRenderer {
        PaperTrailRenderer::new(LifecycleConfig::default())
    }

    fn set(labels: &[&str]) -> BTreeSet<String> {
        labels.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_summary_for_new_issue() {
        assert_eq!(
            renderer().summary(&state(&["#new"])),
            "**Label:** #new.  **What's next?** A reviewer should examine this issue."
        );
    }

    #[test]
    fn test_summary_with_milestone_and_votes() {
        let mut s = state(&["#acknowledged", "#someday"]);
        s.milestone = Some("Someday".to_string());
        s.votes.insert("alice".to_string(), 1);
        s.votes.insert("bob".to_string(), 1);
        assert_eq!(
            renderer().summary(&s),
            "**Milestone:** Someday.  **Votes:** 2.  **Labels:** #acknowledged, #someday.  **What's next?** A reviewer should examine this issue."
        );
    }

    #[test]
    fn test_whats_next_final_word() {
        let r = renderer();
        assert_eq!(
            r.whats_next(None, &set(&["#fixed", "#needs-docs"])),
            "This issue is considered successfully resolved."
        );
    }

    #[test]
    fn test_whats_next_committer() {
        let r = renderer();
        let labels = set(&["#ready-to-commit", "feature"]);
        assert_eq!(
            r.whats_next(None, &labels),
            "The changes for this issue are ready to be committed by a member of the core team."
        );
        assert_eq!(
            r.whats_next(Some("alice"), &labels),
            "The changes for this issue are ready to be committed by @alice."
        );
    }

    #[test]
    fn test_whats_next_needs() {
        let r = renderer();
        assert_eq!(
            r.whats_next(None, &set(&["bug", "#needs-patch"])),
            "This issue needs a volunteer to write and submit code to address it."
        );
        let many = r.whats_next(None, &set(&["#needs-docs", "#needs-patch"]));
        assert!(many.starts_with("\n\n * Additional documentation"));
        assert!(many.contains("\n * This issue needs a volunteer to write"));
    }

    #[test]
    fn test_render_lists_changes_and_rejections() {
        use crate::domain::models::{Directive, DirectiveKind};

        let changes = vec![
            FieldChange::new(
                ChangeKind::LabelAdded { label: "#needs-test".into() },
                Attribution::User { login: "alice".into() },
            ),
            FieldChange::new(
                ChangeKind::LabelRemoved { label: "#accepted".into() },
                Attribution::Implicit { cause: "#wont-fix".into() },
            ),
            FieldChange::new(
                ChangeKind::Milestone { from: None, to: Some("1.0".into()) },
                Attribution::External { actor: None },
            ),
        ];
        let rejected = vec![DirectiveRejection::validation(
            Directive {
                kind: DirectiveKind::AddLabel("#bogus".into()),
                comment_id: 3,
                author: "mallory".into(),
                ordinal: 0,
                source: "+#bogus".into(),
            },
            "unknown label `#bogus`",
        )];

        let body = renderer().render(&state(&["#needs-test"]), &changes, &rejected, 4);
        assert!(body.contains("- Label `#needs-test` added by @alice."));
        assert!(body.contains("- Label `#accepted` removed due to `#wont-fix`."));
        assert!(body.contains("- Milestone changed from none to `1.0` externally."));
        assert!(body.contains("- `+#bogus` from @mallory: unknown label `#bogus`"));
        let marker = PaperTrailMarker::parse(&body).expect("marker present");
        assert_eq!(marker.issue, 12);
        assert_eq!(marker.revision, 4);
    }

    #[test]
    fn test_marker_identifies_pass() {
        let r = renderer();
        let s = state(&["#new"]);
        let a = PaperTrailMarker::parse(&r.render(&s, &[], &[], 0)).expect("marker");
        let b = PaperTrailMarker::parse(&r.render(&s, &[], &[], 0)).expect("marker");
        let c = PaperTrailMarker::parse(&r.render(&s, &[], &[], 1)).expect("marker");
        assert_eq!(a, b);
        assert!(!a.same_pass(&c));

        let mut other = s.clone();
        other.labels.insert("bug".to_string());
        let d = PaperTrailMarker::parse(&r.render(&other, &[], &[], 0)).expect("marker");
        assert!(a.same_pass(&d));
        assert_ne!(a.digest, d.digest);
    }

    #[test]
    fn test_marker_parse_ignores_prose() {
        assert_eq!(PaperTrailMarker::parse("+1 from me"), None);
        let marker = PaperTrailMarker::for_body(7, 3, "body");
        assert_eq!(marker.digest.len(), 12);
        assert_eq!(PaperTrailMarker::parse(&marker.to_string()), Some(marker));
    }
}
