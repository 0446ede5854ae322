//! Error types for the trackline environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to a collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// The requested session, channel or band does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record violated the collaborator contract (unsorted time, NaN time, ...)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Two columns that must be aligned have different lengths
    #[error("Length mismatch for '{name}': expected {expected}, got {actual}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// The underlying storage failed
    #[error("Source error: {0}")]
    Source(String),
}

impl EnvError {
    /// Creates a not-found error.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Creates an invalid-record error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }
}
