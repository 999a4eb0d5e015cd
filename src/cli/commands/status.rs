//! `status`: stored snapshots as a table or JSON.

use anyhow::Result;
use clap::Args;
use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};
use serde::Serialize;

use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::runtime::open_store;
use crate::domain::models::{Config, IssueNumber, IssueState};
use crate::services::vote_tally;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show this issue
    pub issue: Option<IssueNumber>,

    /// Only show open issues
    #[arg(long)]
    pub open: bool,
}

#[derive(Debug, Serialize)]
pub struct SnapshotOutput {
    pub issue: IssueNumber,
    pub title: String,
    pub is_open: bool,
    pub labels: Vec<String>,
    pub milestone: Option<String>,
    pub assignee: Option<String>,
    pub tally: i64,
    pub votes: usize,
    pub last_processed_comment_id: Option<u64>,
    pub revision: u64,
    pub updated_at: String,
}

impl From<&IssueState> for SnapshotOutput {
    fn from(state: &IssueState) -> Self {
        Self {
            issue: state.issue,
            title: state.title.clone(),
            is_open: state.is_open,
            labels: state.labels.iter().cloned().collect(),
            milestone: state.milestone.clone(),
            assignee: state.assignee.clone(),
            tally: vote_tally::tally(&state.votes),
            votes: state.votes.len(),
            last_processed_comment_id: state.last_processed_comment_id,
            revision: state.revision,
            updated_at: state.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub snapshots: Vec<SnapshotOutput>,
    pub total: usize,
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        if self.snapshots.is_empty() {
            return "No issues tracked yet.".to_string();
        }

        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(
            ["Issue", "State", "Title", "Labels", "Milestone", "Assignee", "Tally", "Rev", "Updated"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

        for snapshot in &self.snapshots {
            table.add_row(vec![
                Cell::new(format!("#{}", snapshot.issue)),
                Cell::new(if snapshot.is_open { "open" } else { "closed" }),
                Cell::new(truncate(&snapshot.title, 40)),
                Cell::new(snapshot.labels.join(", ")),
                Cell::new(snapshot.milestone.as_deref().unwrap_or("-")),
                Cell::new(snapshot.assignee.as_deref().map_or_else(|| "-".to_string(), |a| format!("@{a}"))),
                Cell::new(format!("{:+}", snapshot.tally)),
                Cell::new(snapshot.revision),
                Cell::new(&snapshot.updated_at[..snapshot.updated_at.len().min(19)]),
            ]);
        }

        format!("{table}\n{} issue(s) tracked", self.total)
    }
}

pub async fn execute(args: StatusArgs, config: Config, json_mode: bool) -> Result<()> {
    let store = open_store(&config).await?;
    let snapshots: Vec<SnapshotOutput> = store
        .list()
        .await?
        .iter()
        .filter(|s| args.issue.is_none_or(|issue| s.issue == issue))
        .filter(|s| !args.open || s.is_open)
        .map(SnapshotOutput::from)
        .collect();

    output(
        &StatusOutput {
            total: snapshots.len(),
            snapshots,
        },
        json_mode,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[test]
    fn test_human_output_lists_snapshots() {
        let state = IssueState {
            issue: 12,
            labels: ["#accepted".to_string()].into_iter().collect(),
            milestone: Some("1.0".to_string()),
            assignee: Some("alice".to_string()),
            title: "Crash on start [+2]".to_string(),
            is_open: true,
            votes: BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 1)]),
            last_processed_comment_id: Some(9),
            revision: 3,
            updated_at: Utc::now(),
        };
        let out = StatusOutput {
            snapshots: vec![SnapshotOutput::from(&state)],
            total: 1,
        };

        let text = out.to_human();
        assert!(text.contains("#12"));
        assert!(text.contains("@alice"));
        assert!(text.contains("+2"));
        assert_eq!(out.to_json()["snapshots"][0]["tally"], 2);
    }
}
