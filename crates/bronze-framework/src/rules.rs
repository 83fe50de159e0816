//! Matcher builders for common event types, and stock rules.
//!
//! ```rust,ignore
//! use bronze_framework::rules::{on_message, only_to_me, prefix};
//!
//! registry.register(
//!     on_message()
//!         .rule(only_to_me())
//!         .rule(prefix(["echo "]))
//!         .handle(echo_handler),
//! );
//! ```

use crate::handler::{Rule, check};
use crate::matcher::Matcher;

/// A matcher whose type guard accepts events of `post_type`.
pub fn on(post_type: &'static str) -> Matcher {
    Matcher::new().guard(move |event| event.post_type == post_type)
}

pub fn on_message() -> Matcher {
    on("message")
}

pub fn on_notice() -> Matcher {
    on("notice")
}

pub fn on_request() -> Matcher {
    on("request")
}

pub fn on_meta_event() -> Matcher {
    on("meta_event")
}

/// Accepts events addressed to the bot.
pub fn only_to_me() -> Rule {
    check(|ctx| ctx.event().is_to_me)
}

pub fn only_group() -> Rule {
    check(|ctx| ctx.event().is_message() && ctx.event().detail_type() == "group")
}

pub fn only_private() -> Rule {
    check(|ctx| ctx.event().is_message() && ctx.event().detail_type() == "private")
}

pub fn super_user_only() -> Rule {
    check(|ctx| ctx.config().is_super_user(ctx.event().user_id))
}

/// Accepts messages whose first text segment starts with one of
/// `prefixes`. Stores the matched prefix under `prefix` and the trimmed
/// remainder under `args`.
pub fn prefix<I, S>(prefixes: I) -> Rule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
    check(move |ctx| {
        let Some(text) = ctx.event().message.segments().first().and_then(|s| s.as_text()) else {
            return false;
        };
        match prefixes.iter().find(|p| text.starts_with(p.as_str())) {
            Some(p) => {
                ctx.set_state("prefix", p.as_str());
                ctx.set_state("args", text[p.len()..].trim());
                true
            }
            None => false,
        }
    })
}

/// Accepts messages whose plain text contains one of `keywords`, stored
/// under `keyword`.
pub fn keyword<I, S>(keywords: I) -> Rule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let keywords: Vec<String> = keywords.into_iter().map(Into::into).collect();
    check(move |ctx| {
        let text = ctx.extract_plain_text();
        match keywords.iter().find(|k| text.contains(k.as_str())) {
            Some(k) => {
                ctx.set_state("keyword", k.as_str());
                true
            }
            None => false,
        }
    })
}

/// Accepts `<command_prefix><command>` messages. Stores the command under
/// `command` and the trimmed remainder under `args`.
pub fn command<I, S>(commands: I) -> Rule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let commands: Vec<String> = commands.into_iter().map(Into::into).collect();
    check(move |ctx| {
        let Some(text) = ctx.event().message.segments().first().and_then(|s| s.as_text()) else {
            return false;
        };
        let Some(rest) = text.strip_prefix(ctx.config().command_prefix.as_str()) else {
            return false;
        };
        match commands.iter().find(|c| rest.starts_with(c.as_str())) {
            Some(c) => {
                ctx.set_state("command", c.as_str());
                ctx.set_state("args", rest[c.len()..].trim());
                true
            }
            None => false,
        }
    })
}
