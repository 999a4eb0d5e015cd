//! Tracker-reported valid values for directive targets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Labels, milestones and collaborators known to the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub labels: BTreeSet<String>,
    pub milestones: BTreeSet<String>,
    pub collaborators: BTreeSet<String>,
}

impl Catalog {
    /// Resolve a label token to the tracker's canonical label name.
    ///
    /// Matching is case-insensitive. The token is tried as given first,
    /// then with a leading `#` added or removed.
    pub fn resolve_label(&self, token: &str) -> Option<&str> {
        let token = token.trim().to_lowercase();
        let toggled = token
            .strip_prefix('#')
            .map_or_else(|| format!("#{token}"), str::to_string);

        find_case_insensitive(&self.labels, &token)
            .or_else(|| find_case_insensitive(&self.labels, &toggled))
    }

    pub fn resolve_milestone(&self, name: &str) -> Option<&str> {
        find_case_insensitive(&self.milestones, &name.trim().to_lowercase())
    }

    /// Resolve an assignee name, ignoring a leading `@`.
    pub fn resolve_assignee(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        let name = name.strip_prefix('@').unwrap_or(name);
        find_case_insensitive(&self.collaborators, &name.to_lowercase())
    }

    pub fn is_collaborator(&self, user: &str) -> bool {
        find_case_insensitive(&self.collaborators, &user.to_lowercase()).is_some()
    }
}

fn find_case_insensitive<'a>(set: &'a BTreeSet<String>, lowered: &str) -> Option<&'a str> {
    set.iter()
        .find(|candidate| candidate.to_lowercase() == lowered)
        .map(String::as_str)
}
