//! # Bronze
//!
//! A bot framework for OneBot implementations.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐ frames ┌──────────┐ events ┌────────────┐  passes  ┌──────────┐
//! │ platform  │◀──────▶│  Driver  │───────▶│ Dispatcher │─────────▶│ Matchers │
//! └───────────┘        └──────────┘        └────────────┘          └──────────┘
//!                        │    ▲ responses (by echo)                     │
//!                        ▼    │                                         │
//!                     ┌──────────────┐       calls via Context / Bot    │
//!                     │  Correlator  │◀─────────────────────────────────┘
//!                     └──────────────┘
//! ```
//!
//! - **Drivers** ([`transport`]) speak WebSocket or HTTP to the platform and
//!   publish each connected account in the caller directory.
//! - The **Dispatcher** ([`framework`]) normalizes events and runs them
//!   through matchers: type guard, pre-handlers, rules, mid-handlers,
//!   handler and post-handlers, under one deadline per pass.
//! - The **runtime** ([`runtime`]) loads configuration, sets up logging and
//!   starts the configured drivers.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bronze::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RuntimeError> {
//!     let runtime = BronzeRuntime::new()?;
//!     runtime.register(
//!         on_message()
//!             .name("ping")
//!             .rule(command(["ping"]))
//!             .handle(handler(|ctx: Arc<Context>| async move {
//!                 let _ = ctx.reply("pong", true).await;
//!             })),
//!     );
//!     runtime.run_and_block().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*, `yaml-config`: configuration file formats
//! - `full-transport` *(default)*: every driver; or pick `ws-client`,
//!   `ws-server`, `http-client` + `http-server`
//! - `json-log`: JSON log output

pub use bronze_core as core;
pub use bronze_framework as framework;
pub use bronze_runtime as runtime;
pub use bronze_transport as transport;

/// Commonly used items for writing bots.
///
/// ```rust,ignore
/// use bronze::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime
    pub use bronze_runtime::{BronzeConfig, BronzeRuntime, RuntimeError};

    // Matchers and stages
    pub use bronze_framework::{
        Bot, Context, Engine, Handler, Matcher, PassOutcome, Rule, check, handler, rule,
    };

    // Builders and rules
    pub use bronze_framework::{
        command, keyword, on, on_message, on_meta_event, on_notice, on_request, only_group,
        only_private, only_to_me, prefix, super_user_only,
    };

    // Event model
    pub use bronze_core::{ApiError, Content, Event, MessageId, Segment, Sender};

    pub use bronze_runtime::tracing::{debug, error, info, trace, warn};
}
