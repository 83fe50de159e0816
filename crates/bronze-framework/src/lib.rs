//! # Bronze Framework
//!
//! The dispatch engine of the Bronze bot framework.
//!
//! Events handed to a [`Dispatcher`] are matched against the matchers of a
//! [`MatcherRegistry`] in registration order. Each matcher runs through
//! the stages
//!
//! ```text
//! type guard ─▶ pre ─▶ rules ─▶ mid ─▶ handler ─▶ post
//!              └──── shared by an Engine ───┘    (shared)
//! ```
//!
//! where pre, mid and post stages come from the matcher's [`Engine`]. Each
//! stage runs as its own task under one deadline for the whole pass.

pub mod bot;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handler;
mod ingest;
pub mod matcher;
pub mod registry;
pub mod rules;
pub mod triggered;

#[cfg(test)]
mod testing;

pub use bot::{Bot, LoginInfo};
pub use context::Context;
pub use dispatcher::{Dispatcher, PassOutcome};
pub use engine::Engine;
pub use error::{DecodeError, DecodeResult};
pub use handler::{Handler, Rule, check, handler, rule};
pub use matcher::{Matcher, TypeGuard};
pub use registry::MatcherRegistry;
pub use rules::{
    command, keyword, on, on_message, on_meta_event, on_notice, on_request, only_group,
    only_private, only_to_me, prefix, super_user_only,
};
pub use triggered::TriggeredMessages;
