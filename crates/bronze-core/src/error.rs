//! Error types shared by every Bronze crate.
//!
//! Framework-level errors (state projection) live next to the dispatcher in
//! `bronze-framework`; configuration errors live in `bronze-runtime`.

use thiserror::Error;

use crate::api::ApiResponse;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised while establishing or using a connection to the platform.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Dialing the remote endpoint failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The connection was closed by either side.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// The first frame did not carry a usable self id.
    #[error("handshake failed: {reason}")]
    HandshakeFailed {
        /// Reason for failure.
        reason: String,
    },

    /// Writing a frame failed.
    #[error("failed to send frame: {0}")]
    SendFailed(String),

    /// Reading a frame failed.
    #[error("failed to receive frame: {0}")]
    ReceiveFailed(String),

    /// Binding a listener failed.
    #[error("failed to bind {addr}: {reason}")]
    BindFailed {
        /// The address that could not be bound.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// The configured URL could not be used.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Reason for rejection.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error returned from an outbound API call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No response arrived within the call deadline.
    #[error("API call deadline exceeded")]
    DeadlineExceeded,

    /// The connection closed while the call was pending.
    #[error("connection closed while the call was pending")]
    ClosedPipe,

    /// The transport has no live connection to write to.
    #[error("bot is not connected")]
    NotConnected,

    /// The platform answered with a failure, or the HTTP exchange failed
    /// with a non-success status (retcode is `1000 + status` in that case).
    #[error("API call failed (retcode {}): {}", .response.retcode, .response.message)]
    Failed {
        /// The failing response.
        response: Box<ApiResponse>,
    },

    /// A response body could not be interpreted.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// Failed to serialize or deserialize a payload.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
