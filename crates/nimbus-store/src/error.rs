//! Error types for nimbus-store.

use std::path::PathBuf;

/// Result type for nimbus-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nimbus-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Saved location not found.
    #[error("Location not found: {0}")]
    LocationNotFound(String),

    /// A stored timestamp is outside the representable range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// A stored row could not be interpreted.
    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    /// Snapshot (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
