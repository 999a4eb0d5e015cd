//! GitHub REST adapter.

pub mod client;
pub mod models;
mod tracker;

pub use client::GitHubClient;
pub use tracker::GitHubTracker;
