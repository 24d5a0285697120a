//! # docket-common
//!
//! Shared code for the docket-sync service:
//! - Error types
//! - TOML bootstrap configuration and root folder resolution
//! - SQLite initialization and persisted record models
//! - Business-day and timestamp utilities
//! - Sync event bus

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
