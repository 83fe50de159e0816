//! Configuration for the Bronze runtime.
//!
//! Settings are layered with figment (defaults, then a `bronze.*` file,
//! then `BRONZE_*` environment variables) into a [`BronzeConfig`], which is
//! checked by [`validate_config`] before a runtime is built from it.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BronzeConfig, DriverConfig, HttpConfig, LogFormat, LogOutput, LoggingConfig, WsClientConfig,
    WsServerConfig,
};
pub use validation::validate_config;
