//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::reconcile::ReconcileArgs;
use super::commands::run::RunArgs;
use super::commands::status::StatusArgs;

#[derive(Parser)]
#[command(name = "issue-lifecycle")]
#[command(about = "Issue lifecycle bot: comment commands, state labels, vote tallies and paper trails", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Read configuration from this file instead of .issue-lifecycle/
    #[arg(short, long, global = true, env = "ISSUE_LIFECYCLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Compute and log mutations without writing to the tracker or the store
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the tracker and reconcile every issue until interrupted
    Run(RunArgs),

    /// Run a single reconciliation cycle over every issue
    Once {
        /// Do not create missing labels and milestones first
        #[arg(long)]
        skip_bootstrap: bool,
    },

    /// Reconcile one issue
    Reconcile(ReconcileArgs),

    /// Show stored snapshots
    Status(StatusArgs),
}
