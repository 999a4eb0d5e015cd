//! Infrastructure layer module
//!
//! Configuration loading, logging setup, the request budget and retry
//! policy. Tracker and storage implementations live in `adapters`.

pub mod config;
pub mod logging;
pub mod rate_limiter;
pub mod retry;
