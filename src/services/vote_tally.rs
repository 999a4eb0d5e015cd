//! Vote bookkeeping and the title suffix that displays the tally.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::domain::models::UserId;

static TITLE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" \[[-+]?\d+\]$").expect("title marker pattern"));

/// Record `delta` as `user`'s vote, replacing any earlier vote.
pub fn apply_vote(votes: &mut BTreeMap<UserId, i8>, user: &str, delta: i8) {
    votes.insert(user.to_string(), delta.clamp(-1, 1));
}

/// Sum of all recorded votes.
pub fn tally(votes: &BTreeMap<UserId, i8>) -> i64 {
    votes.values().map(|v| i64::from(*v)).sum()
}

/// Strip any trailing tally marker from `title`.
pub fn base_title(title: &str) -> &str {
    TITLE_MARKER
        .find(title)
        .map_or(title, |marker| &title[..marker.start()])
}

/// Title with the tally marker for `tally`; the bare title when zero.
pub fn render_title(title: &str, tally: i64) -> String {
    let base = base_title(title);
    match tally {
        0 => base.to_string(),
        t if t > 0 => format!("{base} [+{t}]"),
        t => format!("{base} [{t}]"),
    }
}
