//! Pure planning step of a reconciliation pass.
//!
//! Given the previous snapshot, the remote issue, its new comments and the
//! tracker catalog, the planner computes the next snapshot, the change list
//! with attribution, the single [`Mutation`] to emit and the paper trail.
//! No I/O happens here.

use std::collections::BTreeSet;

use chrono::Utc;

use crate::domain::models::{
    Attribution, Catalog, ChangeKind, Comment, DirectiveKind, DirectiveRejection, FieldChange,
    IssueNumber, IssueState, LifecycleConfig, Mutation, PermissionScope, RemoteIssue,
    StateTransition,
};

use super::command_parser::CommandParser;
use super::label_policy::{LabelOp, LabelPolicy, LabelRequest};
use super::paper_trail::{PaperTrailMarker, PaperTrailRenderer};
use super::vote_tally::{apply_vote, render_title, tally};

/// Everything a pass observed before planning.
#[derive(Debug, Clone, Copy)]
pub struct PassInput<'a> {
    pub issue: IssueNumber,
    pub previous: Option<&'a IssueState>,
    pub remote: &'a RemoteIssue,
    pub comments: &'a [Comment],
    pub catalog: &'a Catalog,
}

/// Planned outcome of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassPlan {
    pub next: IssueState,
    pub mutation: Mutation,
    pub changes: Vec<FieldChange>,
    pub rejected: Vec<DirectiveRejection>,
    pub accepted: usize,
    pub marker: Option<PaperTrailMarker>,
}

impl PassPlan {
    /// Whether the snapshot must be written even without remote writes.
    pub fn needs_persist(&self, previous: Option<&IssueState>) -> bool {
        previous.is_none_or(|prev| {
            !prev.same_fields(&self.next)
                || prev.last_processed_comment_id != self.next.last_processed_comment_id
        }) || !self.mutation.is_empty()
    }
}

/// Combines parser, label policy, vote tally and renderer.
#[derive(Debug, Clone)]
pub struct PassPlanner {
    lifecycle: LifecycleConfig,
    parser: CommandParser,
    policy: LabelPolicy,
    renderer: PaperTrailRenderer,
}

impl PassPlanner {
    /// Planner for `lifecycle` rules. Comments by `bot_login` and those
    /// carrying the ignore keyword are not parsed.
    pub fn new(lifecycle: LifecycleConfig, bot_login: &str) -> Self {
        Self {
            parser: CommandParser::new(bot_login)
                .with_ignore_keyword(lifecycle.ignore_keyword.clone()),
            policy: LabelPolicy::new(&lifecycle),
            renderer: PaperTrailRenderer::new(lifecycle.clone()),
            lifecycle,
        }
    }

    /// Parser used to read directives.
    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    /// Compiled label rules.
    pub fn policy(&self) -> &LabelPolicy {
        &self.policy
    }

    /// No snapshot exists but the bot has already commented: the snapshot
    /// was lost and the issue should be adopted rather than re-triaged.
    ///
    /// A paper trail from an interrupted first pass over this issue does
    /// not count; that pass is simply repeated.
    pub fn is_adoption(&self, input: &PassInput<'_>) -> bool {
        input.previous.is_none()
            && input
                .comments
                .iter()
                .filter(|comment| self.parser.is_bot(&comment.author))
                .any(|comment| {
                    PaperTrailMarker::parse(&comment.body)
                        .is_none_or(|m| m.issue != input.issue || m.revision != 0)
                })
    }

    /// Snapshot mirroring the remote issue with all comments processed.
    pub fn adopt(&self, input: &PassInput<'_>) -> IssueState {
        let mut state = IssueState::adopt(input.issue, input.remote);
        for directive in self.parser.directives(input.comments) {
            if let DirectiveKind::Vote { user, delta } = &directive.kind {
                apply_vote(&mut state.votes, user, *delta);
            }
        }
        state.last_processed_comment_id = input.comments.iter().map(|c| c.id).max();
        state.revision = 1;
        state
    }

    /// Plan one pass from `input`.
    ///
    /// The change list compares the next snapshot with the previous one,
    /// or with the remote issue on a first sighting, so labels an issue
    /// already carried are not reported. The mutation compares the next
    /// snapshot with the remote issue and is empty when both agree.
    #[allow(clippy::too_many_lines)]
    pub fn plan(&self, input: &PassInput<'_>) -> PassPlan {
        let PassInput {
            issue,
            previous,
            remote,
            comments,
            catalog,
        } = *input;

        // A first sighting starts from what the tracker reports
        let baseline = previous
            .cloned()
            .unwrap_or_else(|| IssueState::adopt(issue, remote));

        let mut labels = remote.labels.clone();
        let mut milestone = remote.milestone.clone();
        let mut assignee = remote.assignee.clone();
        let mut defaulted_labels = BTreeSet::new();
        let mut milestone_by: Option<Attribution> = None;
        let mut assignee_by: Option<Attribution> = None;

        // Defaults only apply to untriaged issues seen for the first time
        if previous.is_none() && remote.labels.is_empty() && remote.milestone.is_none() {
            let defaults = &self.lifecycle.defaults;
            for label in &defaults.labels {
                let name = catalog.resolve_label(label).unwrap_or(label).to_string();
                if labels.insert(name.clone()) {
                    defaulted_labels.insert(name);
                }
            }
            if let Some(default) = &defaults.milestone {
                milestone = Some(catalog.resolve_milestone(default).unwrap_or(default).to_string());
                milestone_by = Some(Attribution::Defaults);
            }
            if assignee.is_none() {
                if let Some(default) = &defaults.assignee {
                    assignee = Some(catalog.resolve_assignee(default).unwrap_or(default).to_string());
                    assignee_by = Some(Attribution::Defaults);
                }
            }
        }

        let permissions = |author: &str| self.lifecycle.permissions_for(author, catalog);
        let mut rejected = Vec::new();
        let mut requests = Vec::new();
        let mut votes = baseline.votes.clone();
        let mut accepted = 0usize;

        for directive in self.parser.directives(comments) {
            match directive.kind.clone() {
                DirectiveKind::AddLabel(token) | DirectiveKind::RemoveLabel(token) => {
                    let op = if matches!(directive.kind, DirectiveKind::AddLabel(_)) {
                        LabelOp::Add
                    } else {
                        LabelOp::Remove
                    };
                    match catalog.resolve_label(&token) {
                        Some(label) => requests.push(LabelRequest {
                            label: label.to_string(),
                            op,
                            directive,
                        }),
                        None => rejected.push(DirectiveRejection::validation(
                            directive,
                            format!("unknown label `{token}`"),
                        )),
                    }
                }
                DirectiveKind::SetMilestone(name) => match catalog.resolve_milestone(&name) {
                    None => rejected.push(DirectiveRejection::validation(
                        directive,
                        format!("unknown milestone `{name}`"),
                    )),
                    Some(_) if !permissions(&directive.author).has_scope(PermissionScope::Milestone) => {
                        rejected.push(DirectiveRejection::permission(
                            directive,
                            "not permitted to set the milestone",
                        ));
                    }
                    Some(resolved) => {
                        milestone = Some(resolved.to_string());
                        milestone_by = Some(Attribution::User {
                            login: directive.author.clone(),
                        });
                        accepted += 1;
                    }
                },
                DirectiveKind::SetAssignee(name) => match catalog.resolve_assignee(&name) {
                    None => rejected.push(DirectiveRejection::validation(
                        directive,
                        format!("unknown assignee `@{name}`"),
                    )),
                    Some(_) if !permissions(&directive.author).has_scope(PermissionScope::Assignee) => {
                        rejected.push(DirectiveRejection::permission(
                            directive,
                            "not permitted to set the assignee",
                        ));
                    }
                    Some(resolved) => {
                        assignee = Some(resolved.to_string());
                        assignee_by = Some(Attribution::User {
                            login: directive.author.clone(),
                        });
                        accepted += 1;
                    }
                },
                DirectiveKind::Vote { user, delta } => {
                    apply_vote(&mut votes, &user, delta);
                    accepted += 1;
                }
            }
        }

        let outcome = self.policy.apply(&labels, &requests, &permissions);
        accepted += requests.len() - outcome.rejected.len();
        rejected.extend(outcome.rejected.iter().cloned());
        rejected.sort_by_key(|r| r.directive.ordinal);

        let mut is_open = remote.is_open;
        if let Some((transition, _)) = &outcome.transition {
            is_open = transition.target_is_open();
        }

        // What this pass's directives do to the baseline. A repeated pass
        // whose earlier attempt already wrote to the tracker credits the
        // same authors as the first attempt did.
        let mut intended_base = baseline.labels.clone();
        intended_base.extend(defaulted_labels.iter().cloned());
        let intended = if intended_base == labels {
            outcome.clone()
        } else {
            self.policy.apply(&intended_base, &requests, &permissions)
        };

        let old_tally = tally(&baseline.votes);
        let new_tally = tally(&votes);
        let title = if old_tally == new_tally {
            remote.title.clone()
        } else {
            render_title(&remote.title, new_tally)
        };

        let last_processed_comment_id = comments
            .iter()
            .map(|c| c.id)
            .max()
            .max(baseline.last_processed_comment_id);

        let next = IssueState {
            issue,
            labels: outcome.labels.clone(),
            milestone,
            assignee,
            title,
            is_open,
            votes,
            last_processed_comment_id,
            revision: baseline.revision + 1,
            updated_at: Utc::now(),
        };

        // Change list against the previous snapshot
        let external = Attribution::External {
            actor: remote.last_actor.clone(),
        };
        let mut changes = Vec::new();
        for label in next.labels.difference(&baseline.labels) {
            let attribution = match intended.applied.get(label) {
                Some(request) if request.op == LabelOp::Add => Attribution::User {
                    login: request.directive.author.clone(),
                },
                _ if defaulted_labels.contains(label) => Attribution::Defaults,
                _ => external.clone(),
            };
            changes.push(FieldChange::new(
                ChangeKind::LabelAdded { label: label.clone() },
                attribution,
            ));
        }
        for label in baseline.labels.difference(&next.labels) {
            let attribution = match intended.applied.get(label) {
                Some(request) if request.op == LabelOp::Remove => Attribution::User {
                    login: request.directive.author.clone(),
                },
                _ => intended.implicit_cause(label).map_or_else(
                    || external.clone(),
                    |cause| Attribution::Implicit {
                        cause: cause.to_string(),
                    },
                ),
            };
            changes.push(FieldChange::new(
                ChangeKind::LabelRemoved { label: label.clone() },
                attribution,
            ));
        }
        if next.milestone != baseline.milestone {
            changes.push(FieldChange::new(
                ChangeKind::Milestone {
                    from: baseline.milestone.clone(),
                    to: next.milestone.clone(),
                },
                milestone_by.unwrap_or_else(|| external.clone()),
            ));
        }
        if next.assignee != baseline.assignee {
            changes.push(FieldChange::new(
                ChangeKind::Assignee {
                    from: baseline.assignee.clone(),
                    to: next.assignee.clone(),
                },
                assignee_by.unwrap_or_else(|| external.clone()),
            ));
        }
        if next.is_open != baseline.is_open {
            let kind = if next.is_open {
                ChangeKind::Opened
            } else {
                ChangeKind::Closed
            };
            let attribution = intended
                .transition
                .as_ref()
                .filter(|(transition, _)| transition.target_is_open() == next.is_open)
                .map_or_else(
                    || external.clone(),
                    |(_, cause)| Attribution::Implicit { cause: cause.clone() },
                );
            changes.push(FieldChange::new(kind, attribution));
        }
        if old_tally != new_tally {
            changes.push(FieldChange::new(
                ChangeKind::Tally {
                    from: old_tally,
                    to: new_tally,
                },
                Attribution::Votes,
            ));
        }

        let mut mutation = Mutation {
            add_labels: next.labels.difference(&remote.labels).cloned().collect(),
            remove_labels: remote.labels.difference(&next.labels).cloned().collect(),
            milestone: next.milestone.clone().filter(|_| next.milestone != remote.milestone),
            assignee: next.assignee.clone().filter(|_| next.assignee != remote.assignee),
            transition: (next.is_open != remote.is_open).then(|| {
                if next.is_open {
                    StateTransition::Open
                } else {
                    StateTransition::Close
                }
            }),
            title: (next.title != remote.title).then(|| next.title.clone()),
            comment: None,
        };

        let mut marker = None;
        if !changes.is_empty() || accepted > 0 {
            let body = self
                .renderer
                .render(&next, &changes, &rejected, baseline.revision);
            marker = PaperTrailMarker::parse(&body);
            mutation.comment = Some(body);
        }

        PassPlan {
            next,
            mutation,
            changes,
            rejected,
            accepted,
            marker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn catalog() -> Catalog {
        Catalog {
            labels: [
                "#new", "#accepted", "#acknowledged", "#wont-fix", "#fixed", "#needs-test", "bug",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            milestones: ["Someday", "1.0"].iter().map(|s| (*s).to_string()).collect(),
            collaborators: ["alice"].iter().map(|s| (*s).to_string()).collect(),
        }
    }

    fn remote(labels: &[&str], milestone: Option<&str>) -> RemoteIssue {
        RemoteIssue {
            number: 5,
            labels: labels.iter().map(|s| (*s).to_string()).collect(),
            milestone: milestone.map(str::to_string),
            assignee: None,
            title: "Widget breaks".to_string(),
            is_open: true,
            last_actor: None,
        }
    }

    fn synced(remote: &RemoteIssue) -> IssueState {
        let mut state = IssueState::adopt(remote.number, remote);
        state.revision = 3;
        state.last_processed_comment_id = Some(100);
        state
    }

    fn comment(id: u64, author: &str, body: &str) -> Comment {
        Comment {
            id,
            author: author.to_string(),
            body: body.to_string(),
        }
    }

    fn planner() -> PassPlanner {
        PassPlanner::new(LifecycleConfig::default(), "bot")
    }

    #[test]
    fn test_new_issue_gets_defaults() {
        let remote = remote(&[], None);
        let catalog = catalog();
        let plan = planner().plan(&PassInput {
            issue: 5,
            previous: None,
            remote: &remote,
            comments: &[],
            catalog: &catalog,
        });

        assert_eq!(plan.next.labels, ["#new".to_string()].into_iter().collect());
        assert_eq!(plan.next.milestone.as_deref(), Some("Someday"));
        assert_eq!(plan.changes.len(), 2);
        assert!(plan.changes.iter().all(|c| c.attribution == Attribution::Defaults));
        assert!(plan.mutation.add_labels.contains("#new"));
        assert_eq!(plan.mutation.milestone.as_deref(), Some("Someday"));
        let body = plan.mutation.comment.as_deref().expect("paper trail");
        assert!(body.contains("#new"));
        assert!(body.contains("Someday"));
        assert_eq!(plan.next.revision, 1);
    }

    #[test]
    fn test_labelled_first_sighting_reports_nothing() {
        let remote = remote(&["#accepted", "bug"], None);
        let catalog = catalog();
        let plan = planner().plan(&PassInput {
            issue: 5,
            previous: None,
            remote: &remote,
            comments: &[],
            catalog: &catalog,
        });

        assert!(plan.changes.is_empty());
        assert!(plan.mutation.is_empty());
        assert_eq!(plan.next.labels, remote.labels);
        assert!(plan.needs_persist(None));
    }

    #[test]
    fn test_repeated_pass_credits_the_directive_author() {
        let before = remote(&["#accepted"], Some("Someday"));
        let previous = synced(&before);
        // An earlier attempt already wrote its fields
        let mut now = before.clone();
        now.labels = ["#wont-fix".to_string()].into_iter().collect();
        now.milestone = Some("1.0".to_string());
        now.is_open = false;
        now.last_actor = Some("bot".to_string());
        let catalog = catalog();
        let comments = [comment(101, "alice", "+#wont-fix\nmilestone=1.0")];

        let plan = planner().plan(&PassInput {
            issue: 5,
            previous: Some(&previous),
            remote: &now,
            comments: &comments,
            catalog: &catalog,
        });

        assert!(!plan.mutation.has_field_writes());
        let alice = Attribution::User {
            login: "alice".to_string(),
        };
        let implicit = Attribution::Implicit {
            cause: "#wont-fix".to_string(),
        };
        for change in &plan.changes {
            let expected = match &change.kind {
                ChangeKind::LabelAdded { .. } | ChangeKind::Milestone { .. } => &alice,
                ChangeKind::LabelRemoved { .. } | ChangeKind::Closed => &implicit,
                other => panic!("unexpected change {other:?}"),
            };
            assert_eq!(&change.attribution, expected, "{:?}", change.kind);
        }
        assert_eq!(plan.changes.len(), 4);
    }

    #[test]
    fn test_no_input_means_no_mutation() {
        let remote = remote(&["#accepted"], Some("1.0"));
        let previous = synced(&remote);
        let catalog = catalog();
        let plan = planner().plan(&PassInput {
            issue: 5,
            previous: Some(&previous),
            remote: &remote,
            comments: &[],
            catalog: &catalog,
        });

        assert!(plan.mutation.is_empty());
        assert!(plan.changes.is_empty());
        assert!(!plan.needs_persist(Some(&previous)));
    }

    #[test]
    fn test_rejections_only_post_nothing() {
        let remote = remote(&["#accepted"], Some("1.0"));
        let previous = synced(&remote);
        let catalog = catalog();
        let comments = [comment(101, "mallory", "+#bogus\n-#accepted")];
        let plan = planner().plan(&PassInput {
            issue: 5,
            previous: Some(&previous),
            remote: &remote,
            comments: &comments,
            catalog: &catalog,
        });

        assert_eq!(plan.rejected.len(), 2);
        assert_eq!(plan.accepted, 0);
        assert!(plan.mutation.is_empty());
        // Comments were still consumed
        assert!(plan.needs_persist(Some(&previous)));
        assert_eq!(plan.next.last_processed_comment_id, Some(101));
    }

    #[test]
    fn test_external_drift_is_attributed() {
        let before = remote(&["#accepted"], Some("1.0"));
        let previous = synced(&before);
        let mut now = before.clone();
        now.milestone = Some("Someday".to_string());
        now.last_actor = Some("carol".to_string());
        let catalog = catalog();

        let plan = planner().plan(&PassInput {
            issue: 5,
            previous: Some(&previous),
            remote: &now,
            comments: &[],
            catalog: &catalog,
        });

        assert_eq!(plan.changes.len(), 1);
        assert_eq!(
            plan.changes[0].attribution,
            Attribution::External {
                actor: Some("carol".to_string())
            }
        );
        // Drift is accepted, nothing to write back except the comment
        assert!(!plan.mutation.has_field_writes());
        assert!(plan.mutation.comment.is_some());
    }

    #[test]
    fn test_votes_rewrite_title() {
        let remote = remote(&["#accepted"], Some("1.0"));
        let previous = synced(&remote);
        let catalog = catalog();
        let comments = [
            comment(101, "alice", "+1"),
            comment(102, "bob", "+1"),
            comment(103, "alice", "-1"),
        ];
        let plan = planner().plan(&PassInput {
            issue: 5,
            previous: Some(&previous),
            remote: &remote,
            comments: &comments,
            catalog: &catalog,
        });

        assert_eq!(plan.next.votes, BTreeMap::from([("alice".into(), -1), ("bob".into(), 1)]));
        assert!(plan.mutation.title.is_none());
        assert_eq!(plan.accepted, 3);
    }

    #[test]
    fn test_adoption_recounts_votes() {
        let remote = remote(&["#accepted"], None);
        let catalog = catalog();
        let comments = [
            comment(1, "alice", "+1"),
            comment(2, "bot", "**Label:** #accepted."),
            comment(3, "bob", "+1"),
        ];
        let input = PassInput {
            issue: 5,
            previous: None,
            remote: &remote,
            comments: &comments,
            catalog: &catalog,
        };
        let planner = planner();
        assert!(planner.is_adoption(&input));
        let state = planner.adopt(&input);
        assert_eq!(tally(&state.votes), 2);
        assert_eq!(state.last_processed_comment_id, Some(3));
    }

    #[test]
    fn test_milestone_permission() {
        let remote = remote(&["#accepted"], Some("1.0"));
        let previous = synced(&remote);
        let catalog = catalog();
        let comments = [comment(101, "mallory", "milestone=Someday")];
        let plan = planner().plan(&PassInput {
            issue: 5,
            previous: Some(&previous),
            remote: &remote,
            comments: &comments,
            catalog: &catalog,
        });
        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(
            plan.rejected[0].kind,
            crate::domain::models::RejectionKind::Permission
        );
        assert_eq!(plan.next.milestone.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_interrupted_first_pass_is_not_adoption() {
        let remote = remote(&[], None);
        let catalog = catalog();
        let comments = [comment(
            7,
            "bot",
            "**What's next?** A reviewer should examine this issue.\n\n<!-- issue-lifecycle:5.0.0123456789ab -->",
        )];
        let mut input = PassInput {
            issue: 5,
            previous: None,
            remote: &remote,
            comments: &comments,
            catalog: &catalog,
        };
        assert!(!planner().is_adoption(&input));

        input.issue = 6;
        assert!(planner().is_adoption(&input));
    }
}
