//! Label policy engine.
//!
//! A pure function from the current label set and the label directives of
//! one pass to the final label set, the implicit removals it caused and
//! the open/close transition it implies. Rule matching is case-insensitive.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::models::{
    AuthorPermissions, Directive, DirectiveRejection, LifecycleConfig, StateTransition,
};

/// Direction of a label directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOp {
    Add,
    Remove,
}

/// A validated label directive with the tracker's canonical label name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRequest {
    pub label: String,
    pub op: LabelOp,
    pub directive: Directive,
}

/// A label removed as a consequence of another label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplicitRemoval {
    pub label: String,
    pub cause: String,
}

/// Result of applying the policy to one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub labels: BTreeSet<String>,
    /// Explicit directives that took effect, keyed by canonical label
    pub applied: BTreeMap<String, LabelRequest>,
    pub implicit_removals: Vec<ImplicitRemoval>,
    /// Requested transition and the label that caused it
    pub transition: Option<(StateTransition, String)>,
    pub rejected: Vec<DirectiveRejection>,
}

impl PolicyOutcome {
    /// Label whose addition removed `label`, if the removal was implicit.
    pub fn implicit_cause(&self, label: &str) -> Option<&str> {
        self.implicit_removals
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.cause.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventWeight {
    Implicit,
    Explicit,
}

/// Compiled label rules.
#[derive(Debug, Clone)]
pub struct LabelPolicy {
    groups: Vec<Vec<String>>,
    auto_remove: BTreeMap<String, Vec<String>>,
    closing: BTreeSet<String>,
    reopening: BTreeSet<String>,
}

fn key(label: &str) -> String {
    label.to_lowercase()
}

impl LabelPolicy {
    /// Compile the exclusive groups, auto-removals and open/close rules of
    /// `config`. Label names are matched case-insensitively.
    pub fn new(config: &LifecycleConfig) -> Self {
        Self {
            groups: config
                .exclusive_groups
                .iter()
                .map(|group| group.iter().map(|l| key(l)).collect())
                .collect(),
            auto_remove: config
                .auto_remove
                .iter()
                .map(|(trigger, targets)| (key(trigger), targets.iter().map(|l| key(l)).collect()))
                .collect(),
            closing: config.closing_labels.iter().map(|l| key(l)).collect(),
            reopening: config.reopening_labels.iter().map(|l| key(l)).collect(),
        }
    }

    /// Apply `requests` to `current`.
    ///
    /// Requests are processed in ordinal order. When a label is both added
    /// and removed in one pass the later directive wins.
    pub fn apply<P>(
        &self,
        current: &BTreeSet<String>,
        requests: &[LabelRequest],
        permissions: P,
    ) -> PolicyOutcome
    where
        P: Fn(&str) -> AuthorPermissions,
    {
        let mut outcome = PolicyOutcome::default();

        // 1. Permission check
        let mut permitted: Vec<&LabelRequest> = Vec::with_capacity(requests.len());
        for request in requests {
            if permissions(&request.directive.author).may_change_label(&request.label) {
                permitted.push(request);
            } else {
                outcome.rejected.push(DirectiveRejection::permission(
                    request.directive.clone(),
                    format!("not permitted to change label `{}`", request.label),
                ));
            }
        }
        permitted.sort_by_key(|r| r.directive.ordinal);

        // Last directive per label wins
        let mut intent: BTreeMap<String, &LabelRequest> = BTreeMap::new();
        for request in permitted {
            intent.insert(key(&request.label), request);
        }

        let mut working: BTreeMap<String, String> =
            current.iter().map(|l| (key(l), l.clone())).collect();
        // Labels present before the pass are the oldest (age 0)
        let mut age: HashMap<String, usize> = HashMap::new();
        let mut events: Vec<(usize, EventWeight, StateTransition, String)> = Vec::new();

        // 2. Removals first, then additions
        for (label_key, request) in intent.iter().filter(|(_, r)| r.op == LabelOp::Remove) {
            let position = request.directive.ordinal + 1;
            if let Some(canonical) = working.remove(label_key) {
                if self.reopening.contains(label_key) {
                    events.push((position, EventWeight::Explicit, StateTransition::Open, canonical.clone()));
                }
                outcome.applied.insert(canonical, (*request).clone());
            }
        }
        for (label_key, request) in intent.iter().filter(|(_, r)| r.op == LabelOp::Add) {
            let position = request.directive.ordinal + 1;
            let canonical = working
                .entry(label_key.clone())
                .or_insert_with(|| request.label.clone())
                .clone();
            age.insert(label_key.clone(), position);
            if !current.contains(&canonical) {
                outcome.applied.insert(canonical, (*request).clone());
            }
        }

        // 3. Exclusivity: keep the most recently added member of each group
        for group in &self.groups {
            let present: Vec<(usize, &String)> = group
                .iter()
                .enumerate()
                .filter(|(_, member)| working.contains_key(*member))
                .collect();
            if present.len() < 2 {
                continue;
            }
            // Ties among pre-existing members go to the later group position
            let Some(&(_, winner)) = present
                .iter()
                .max_by_key(|&&(index, member)| (age.get(member).copied().unwrap_or(0), index))
            else {
                continue;
            };
            let winner = winner.clone();
            let winner_name = working.get(&winner).cloned().unwrap_or_else(|| winner.clone());
            let position = age.get(&winner).copied().unwrap_or(0);
            for (_, member) in present {
                if *member != winner {
                    self.remove_implicitly(
                        &mut working,
                        current,
                        member,
                        &winner_name,
                        position,
                        &mut outcome,
                        &mut events,
                    );
                }
            }
        }

        // 4. Auto-removal rules
        for (trigger, targets) in &self.auto_remove {
            let Some(trigger_name) = working.get(trigger).cloned() else {
                continue;
            };
            let position = age.get(trigger).copied().unwrap_or(0);
            for target in targets {
                if target != trigger && working.contains_key(target) {
                    self.remove_implicitly(
                        &mut working,
                        current,
                        target,
                        &trigger_name,
                        position,
                        &mut outcome,
                        &mut events,
                    );
                }
            }
        }

        // 5. Implicit open/close: a closing label must survive to count
        for (label_key, request) in intent.iter().filter(|(_, r)| r.op == LabelOp::Add) {
            if self.closing.contains(label_key) {
                if let Some(canonical) = working.get(label_key) {
                    events.push((
                        request.directive.ordinal + 1,
                        EventWeight::Explicit,
                        StateTransition::Close,
                        canonical.clone(),
                    ));
                }
            }
        }

        // Applied adds that did not survive are not effective
        outcome
            .applied
            .retain(|label, request| request.op == LabelOp::Remove || working.contains_key(&key(label)));

        outcome.transition = events
            .into_iter()
            .max_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)))
            .map(|(_, _, transition, cause)| (transition, cause));
        outcome.labels = working.into_values().collect();
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn remove_implicitly(
        &self,
        working: &mut BTreeMap<String, String>,
        current: &BTreeSet<String>,
        label_key: &str,
        cause: &str,
        position: usize,
        outcome: &mut PolicyOutcome,
        events: &mut Vec<(usize, EventWeight, StateTransition, String)>,
    ) {
        let Some(canonical) = working.remove(label_key) else {
            return;
        };
        if current.contains(&canonical) {
            if self.reopening.contains(label_key) {
                events.push((position, EventWeight::Implicit, StateTransition::Open, cause.to_string()));
            }
            outcome.implicit_removals.push(ImplicitRemoval {
                label: canonical,
                cause: cause.to_string(),
            });
        }
    }

    /// Whether at most one member of every group is present.
    pub fn is_consistent(&self, labels: &BTreeSet<String>) -> bool {
        let keys: BTreeSet<String> = labels.iter().map(|l| key(l)).collect();
        self.groups
            .iter()
            .all(|group| group.iter().filter(|m| keys.contains(*m)).count() <= 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DirectiveKind;

    fn labels(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn request(ordinal: usize, op: LabelOp, label: &str) -> LabelRequest {
        let kind = match op {
            LabelOp::Add => DirectiveKind::AddLabel(label.to_string()),
            LabelOp::Remove => DirectiveKind::RemoveLabel(label.to_string()),
        };
        LabelRequest {
            label: label.to_string(),
            op,
            directive: Directive {
                kind,
                comment_id: 1,
                author: "alice".to_string(),
                ordinal,
                source: String::new(),
            },
        }
    }

    fn everyone(_: &str) -> AuthorPermissions {
        AuthorPermissions::collaborator()
    }

    fn policy() -> LabelPolicy {
        LabelPolicy::new(&LifecycleConfig::default())
    }

    #[test]
    fn test_add_and_remove() {
        let outcome = policy().apply(
            &labels(&["#new"]),
            &[
                request(0, LabelOp::Add, "#needs-test"),
                request(1, LabelOp::Remove, "#new"),
            ],
            everyone,
        );
        assert_eq!(outcome.labels, labels(&["#needs-test"]));
        assert!(outcome.applied.contains_key("#needs-test"));
        assert!(outcome.applied.contains_key("#new"));
        assert!(outcome.implicit_removals.is_empty());
        assert!(outcome.transition.is_none());
    }

    #[test]
    fn test_exclusive_label_replaces_and_closes() {
        let outcome = policy().apply(
            &labels(&["#accepted", "bug"]),
            &[request(0, LabelOp::Add, "#wont-fix")],
            everyone,
        );
        assert_eq!(outcome.labels, labels(&["#wont-fix", "bug"]));
        assert_eq!(outcome.implicit_cause("#accepted"), Some("#wont-fix"));
        assert_eq!(
            outcome.transition,
            Some((StateTransition::Close, "#wont-fix".to_string()))
        );
    }

    #[test]
    fn test_later_directive_wins_within_group() {
        let outcome = policy().apply(
            &labels(&["#new"]),
            &[
                request(0, LabelOp::Add, "#fixed"),
                request(1, LabelOp::Add, "#accepted"),
            ],
            everyone,
        );
        assert_eq!(outcome.labels, labels(&["#accepted"]));
        // #fixed never reached the issue, so nothing closes
        assert!(outcome.transition.is_none());
        assert!(!outcome.applied.contains_key("#fixed"));
        assert_eq!(outcome.implicit_cause("#new"), Some("#accepted"));
    }

    #[test]
    fn test_same_label_added_then_removed() {
        let outcome = policy().apply(
            &labels(&[]),
            &[
                request(0, LabelOp::Add, "bug"),
                request(1, LabelOp::Remove, "bug"),
            ],
            everyone,
        );
        assert!(outcome.labels.is_empty());
    }

    #[test]
    fn test_auto_removal() {
        let outcome = policy().apply(
            &labels(&["#acknowledged", "#needs-info", "#needs-patch"]),
            &[request(0, LabelOp::Add, "#accepted")],
            everyone,
        );
        assert_eq!(outcome.labels, labels(&["#accepted", "#needs-patch"]));
        assert_eq!(outcome.implicit_cause("#needs-info"), Some("#accepted"));
        assert_eq!(outcome.implicit_cause("#acknowledged"), Some("#accepted"));
    }

    #[test]
    fn test_removing_closing_label_reopens() {
        let outcome = policy().apply(
            &labels(&["#fixed"]),
            &[request(0, LabelOp::Remove, "#fixed")],
            everyone,
        );
        assert_eq!(
            outcome.transition,
            Some((StateTransition::Open, "#fixed".to_string()))
        );
    }

    #[test]
    fn test_replacing_closing_label_with_open_state_reopens() {
        let outcome = policy().apply(
            &labels(&["#wont-fix"]),
            &[request(0, LabelOp::Add, "#accepted")],
            everyone,
        );
        assert_eq!(outcome.labels, labels(&["#accepted"]));
        assert_eq!(
            outcome.transition,
            Some((StateTransition::Open, "#accepted".to_string()))
        );
    }

    #[test]
    fn test_closing_label_swap_stays_closed() {
        let outcome = policy().apply(
            &labels(&["#wont-fix"]),
            &[request(0, LabelOp::Add, "#fixed")],
            everyone,
        );
        assert_eq!(outcome.labels, labels(&["#fixed"]));
        assert_eq!(
            outcome.transition,
            Some((StateTransition::Close, "#fixed".to_string()))
        );
    }

    #[test]
    fn test_later_reopen_beats_earlier_close() {
        let outcome = policy().apply(
            &labels(&["#duplicate"]),
            &[
                request(0, LabelOp::Add, "#fixed"),
                request(1, LabelOp::Remove, "#duplicate"),
            ],
            everyone,
        );
        assert_eq!(
            outcome.transition,
            Some((StateTransition::Open, "#duplicate".to_string()))
        );
    }

    #[test]
    fn test_permission_rejection() {
        let mut config = LifecycleConfig::default();
        config
            .permissions
            .labels
            .insert("#needs-info".to_string(), vec!["alice".to_string()]);
        let policy = LabelPolicy::new(&config);

        let outcome = policy.apply(
            &labels(&["#new"]),
            &[
                request(0, LabelOp::Add, "#needs-info"),
                request(1, LabelOp::Remove, "#new"),
            ],
            |_: &str| config.permissions_for("alice", &Default::default()),
        );
        assert_eq!(outcome.labels, labels(&["#needs-info", "#new"]));
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].directive.ordinal, 1);
    }

    #[test]
    fn test_pre_existing_conflict_is_resolved_deterministically() {
        let policy = policy();
        let outcome = policy.apply(&labels(&["#new", "#accepted"]), &[], everyone);
        assert_eq!(outcome.labels, labels(&["#accepted"]));
        assert!(policy.is_consistent(&outcome.labels));
    }

    #[test]
    fn test_case_insensitive_rules() {
        let outcome = policy().apply(
            &labels(&["#Accepted"]),
            &[request(0, LabelOp::Add, "#wont-fix")],
            everyone,
        );
        assert_eq!(outcome.labels, labels(&["#wont-fix"]));
        assert_eq!(outcome.implicit_cause("#Accepted"), Some("#wont-fix"));
    }
}
