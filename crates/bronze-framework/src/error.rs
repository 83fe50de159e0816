//! Error types for the Bronze framework.

use thiserror::Error;

/// Returned when scratch state cannot be projected onto a target type.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode context state: {0}")]
    State(#[from] serde_json::Error),
}

/// Result type for state projection.
pub type DecodeResult<T> = Result<T, DecodeError>;
