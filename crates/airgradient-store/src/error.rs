//! Error types for airgradient-store.

use std::path::PathBuf;

/// Result type for airgradient-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in airgradient-store.
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

    /// An appended record was not strictly newer than the last one.
    #[error("Record timestamp {timestamp} is not after the last archived timestamp {last}")]
    NonMonotonicTimestamp { timestamp: i64, last: i64 },

    /// The database was written with a schema this build does not know.
    #[error("Unsupported archive schema version {found} (expected {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },
}
