//! Error types for data parsing in airgradient-types.

use thiserror::Error;

/// Errors that can occur when parsing a device snapshot.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The body was not valid JSON, or a field had the wrong type.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The body was valid JSON but not a JSON object.
    #[error("Expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    /// None of the known sensor fields were present.
    #[error("Snapshot contains no sensor fields")]
    NoSensorFields,
}

/// Result type alias using airgradient-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
