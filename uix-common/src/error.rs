//! Error types shared by the UIX crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Lock contention outlasted the retry budget
    #[error("Database locked after {attempts} attempts ({elapsed_ms} ms)")]
    DatabaseLocked { attempts: u32, elapsed_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Run, source value or schedule absent
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Text that is not a ledger month label
    #[error("Invalid month: {0}")]
    InvalidMonth(String),

    /// A stored column failed to decode into its model type
    #[error("Corrupt record field {field}: {detail}")]
    CorruptRecord { field: String, detail: String },
}

impl Error {
    pub fn corrupt(field: &str, detail: impl std::fmt::Display) -> Self {
        Error::CorruptRecord {
            field: field.to_string(),
            detail: detail.to_string(),
        }
    }
}
