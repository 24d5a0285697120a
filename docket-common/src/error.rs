//! Error type shared by the docket-sync crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// State store stayed locked past the lock-retry budget
    #[error("Database still locked after {attempts} attempts ({operation}, {elapsed_ms} ms)")]
    StoreLocked {
        operation: String,
        attempts: u32,
        elapsed_ms: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A setting is missing or out of range
    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    /// The source id already owns a board item
    #[error("Source id {0} is already mapped")]
    AlreadyMapped(i64),

    #[error("No mapping for source id {0}")]
    MappingNotFound(i64),

    /// A stored date or timestamp that does not parse
    #[error("Corrupt stored value '{value}': {reason}")]
    CorruptValue { value: String, reason: String },

    #[error("Invalid fixture: {0}")]
    InvalidFixture(String),
}
