//! Runtime error types.

use bronze_core::TransportError;
use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors raised while building or starting a runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A driver could not be constructed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The configured driver type was compiled out.
    #[error("driver '{0}' is not available; enable its cargo feature")]
    DriverUnavailable(&'static str),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
