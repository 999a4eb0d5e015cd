//! Comment command parser.
//!
//! Turns comment bodies into [`Directive`]s. Parsing is line oriented:
//! every trimmed line is either a command or prose, and prose is ignored.
//! Targets are not validated here; unknown names flow through verbatim and
//! are rejected later against the tracker catalog.

use regex::Regex;
use std::sync::LazyLock;

use crate::domain::models::{Comment, Directive, DirectiveKind};

static VOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-+]?0|[-+]1)$").expect("vote pattern"));

// The token may not start with whitespace so Markdown bullets stay prose.
static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([-+])([-\w_#](?:[-\w _#]*[-\w_#])?)$").expect("label pattern")
});

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(milestone|assignee)\s*=\s*(\S(?:.*\S)?)$").expect("assignment pattern")
});

/// Parses comment commands, skipping comments written by the bot itself.
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    bot_login: Option<String>,
    ignore_keyword: Option<String>,
}

impl CommandParser {
    /// Parser that skips comments written by `bot_login`, compared
    /// case-insensitively.
    ///
    /// ```
    /// use issue_lifecycle::services::CommandParser;
    ///
    /// let parser = CommandParser::new("Lifecycle-Bot");
    /// assert!(parser.is_bot("lifecycle-bot"));
    /// assert!(!parser.is_bot("alice"));
    /// ```
    pub fn new(bot_login: impl Into<String>) -> Self {
        Self {
            bot_login: Some(bot_login.into().to_lowercase()),
            ignore_keyword: None,
        }
    }

    /// Skip every comment whose body contains `keyword`, in any case.
    #[must_use]
    pub fn with_ignore_keyword(mut self, keyword: Option<String>) -> Self {
        self.ignore_keyword = keyword
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty());
        self
    }

    /// Whether `author` is the bot account.
    pub fn is_bot(&self, author: &str) -> bool {
        self.bot_login
            .as_deref()
            .is_some_and(|bot| bot == author.to_lowercase())
    }

    /// Whether `comment` opted out of directive parsing.
    pub fn is_ignored(&self, comment: &Comment) -> bool {
        self.ignore_keyword
            .as_deref()
            .is_some_and(|keyword| comment.body.to_lowercase().contains(keyword))
    }

    /// Directives in comment order, then line order.
    ///
    /// The iterator is lazy and borrows `comments`; calling this again
    /// restarts from the first comment with the same ordinals.
    pub fn directives<'a>(&'a self, comments: &'a [Comment]) -> impl Iterator<Item = Directive> + 'a {
        comments
            .iter()
            .filter(move |comment| !self.is_bot(&comment.author) && !self.is_ignored(comment))
            .flat_map(|comment| {
                comment.body.lines().filter_map(move |line| {
                    let line = line.trim();
                    parse_line(line, &comment.author).map(|kind| Directive {
                        kind,
                        comment_id: comment.id,
                        author: comment.author.clone(),
                        ordinal: 0,
                        source: line.to_string(),
                    })
                })
            })
            .enumerate()
            .map(|(ordinal, directive)| Directive { ordinal, ..directive })
    }
}

/// Parse one trimmed line.
pub fn parse_line(line: &str, author: &str) -> Option<DirectiveKind> {
    if VOTE.is_match(line) {
        let delta = match line {
            "+1" => 1,
            "-1" => -1,
            _ => 0,
        };
        return Some(DirectiveKind::Vote {
            user: author.to_string(),
            delta,
        });
    }

    if let Some(caps) = LABEL.captures(line) {
        let label = caps[2].to_lowercase();
        return Some(if &caps[1] == "+" {
            DirectiveKind::AddLabel(label)
        } else {
            DirectiveKind::RemoveLabel(label)
        });
    }

    if let Some(caps) = ASSIGNMENT.captures(line) {
        let value = caps[2].to_string();
        return Some(if caps[1].eq_ignore_ascii_case("milestone") {
            DirectiveKind::SetMilestone(value)
        } else {
            let user = value.strip_prefix('@').unwrap_or(&value).to_string();
            DirectiveKind::SetAssignee(user)
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: u64, author: &str, body: &str) -> Comment {
        Comment {
            id,
            author: author.to_string(),
            body: body.to_string(),
        }
    }

    fn kinds(comments: &[Comment]) -> Vec<DirectiveKind> {
        CommandParser::new("bot").directives(comments).map(|d| d.kind).collect()
    }

    #[test]
    fn test_label_directives_are_lowercased() {
        let parsed = kinds(&[comment(1, "alice", "+#Needs-Test\n-new\n+needs info")]);
        assert_eq!(
            parsed,
            vec![
                DirectiveKind::AddLabel("#needs-test".into()),
                DirectiveKind::RemoveLabel("new".into()),
                DirectiveKind::AddLabel("needs info".into()),
            ]
        );
    }

    #[test]
    fn test_votes() {
        let parsed = kinds(&[comment(1, "alice", "+1\n-1\n+0\n0\n-0")]);
        let deltas: Vec<i8> = parsed
            .iter()
            .map(|k| match k {
                DirectiveKind::Vote { delta, .. } => *delta,
                other => panic!("Expected vote, got {other:?}"),
            })
            .collect();
        assert_eq!(deltas, vec![1, -1, 0, 0, 0]);
    }

    #[test]
    fn test_assignments() {
        let parsed = kinds(&[comment(
            1,
            "alice",
            "milestone=1.0\nMilestone = Someday Maybe\nassignee=@bob\nassignee = carol",
        )]);
        assert_eq!(
            parsed,
            vec![
                DirectiveKind::SetMilestone("1.0".into()),
                DirectiveKind::SetMilestone("Someday Maybe".into()),
                DirectiveKind::SetAssignee("bob".into()),
                DirectiveKind::SetAssignee("carol".into()),
            ]
        );
    }

    #[test]
    fn test_prose_is_ignored() {
        let parsed = kinds(&[comment(
            1,
            "alice",
            "I tried this.\n- it fails on start\n+ also here\nmilestone =\n+trailing \n",
        )]);
        // "+trailing " is trimmed to a valid label line
        assert_eq!(parsed, vec![DirectiveKind::AddLabel("trailing".into())]);
    }

    #[test]
    fn test_bot_comments_are_skipped() {
        let comments = [
            comment(1, "Bot", "+#fixed"),
            comment(2, "alice", "+#accepted"),
        ];
        assert_eq!(kinds(&comments), vec![DirectiveKind::AddLabel("#accepted".into())]);
    }

    #[test]
    fn test_comments_with_ignore_keyword_are_skipped() {
        let comments = [
            comment(1, "alice", "Quoting the old triage:\n+#wont-fix\n#Lifecycle-Ignore"),
            comment(2, "alice", "+#accepted"),
        ];
        let parser = CommandParser::new("bot").with_ignore_keyword(Some("#lifecycle-ignore".into()));
        let parsed: Vec<DirectiveKind> = parser.directives(&comments).map(|d| d.kind).collect();
        assert_eq!(parsed, vec![DirectiveKind::AddLabel("#accepted".into())]);

        let ordinals: Vec<usize> = parser.directives(&comments).map(|d| d.ordinal).collect();
        assert_eq!(ordinals, vec![0]);
    }

    #[test]
    fn test_blank_ignore_keyword_skips_nothing() {
        let comments = [comment(1, "alice", "+#accepted")];
        let parser = CommandParser::new("bot").with_ignore_keyword(Some("  ".into()));
        assert_eq!(parser.directives(&comments).count(), 1);
    }

    #[test]
    fn test_ordinals_span_comments_and_restart() {
        let comments = [
            comment(10, "alice", "+#a\nhello\n-#b"),
            comment(11, "bob", "+1"),
        ];
        let parser = CommandParser::new("bot");

        let first: Vec<(usize, u64, String)> = parser
            .directives(&comments)
            .map(|d| (d.ordinal, d.comment_id, d.author))
            .collect();
        assert_eq!(
            first,
            vec![
                (0, 10, "alice".to_string()),
                (1, 10, "alice".to_string()),
                (2, 11, "bob".to_string()),
            ]
        );

        let again: Vec<usize> = parser.directives(&comments).map(|d| d.ordinal).collect();
        assert_eq!(again, vec![0, 1, 2]);
    }

    #[test]
    fn test_source_line_is_kept() {
        let comments = [comment(1, "alice", "   +#Bogus   ")];
        let directive = CommandParser::new("bot")
            .directives(&comments)
            .next()
            .expect("one directive");
        assert_eq!(directive.source, "+#Bogus");
    }
}
