//! Domain layer for issue lifecycle automation
//!
//! This module contains the models, ports and errors shared by every
//! other layer. It has no knowledge of transports or storage engines.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, ReconcileError, TransportError};
