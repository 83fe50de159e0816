//! # Bronze Runtime
//!
//! Turns a configuration into running drivers:
//!
//! - [`config`]: figment-layered [`BronzeConfig`] loading and validation
//! - [`logging`]: `tracing-subscriber` setup driven by the `logging` section
//! - [`BronzeRuntime`]: owns the caller directory, the matcher registry and
//!   the dispatcher, and runs one driver per configured transport
//!
//! Transports are compiled in by feature (`ws-client`, `ws-server`,
//! `http-client` + `http-server`, or `full-transport`). A configured
//! transport whose feature is off fails the build of the runtime with
//! [`RuntimeError::DriverUnavailable`].

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{BronzeConfig, ConfigError, ConfigLoader, ConfigResult, DriverConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingGuard};
pub use runtime::{BronzeRuntime, RuntimeBuilder};

pub use tracing;
