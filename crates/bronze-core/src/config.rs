//! Bot-level settings consumed by the normalizer and the dispatcher.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the dispatcher treats inbound events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Names that address the bot when a message starts with one of them.
    pub nickname: Vec<String>,
    /// Prefix for commands, used by command-style rules.
    pub command_prefix: String,
    /// Users allowed through `super_user_only`.
    pub super_users: Vec<i64>,
    /// Capacity of the ingestion buffer; 0 dispatches directly.
    pub ring_len: usize,
    /// Delay before dispatch, in milliseconds.
    pub latency_ms: u64,
    /// Deadline shared by every stage of one dispatch pass.
    pub max_process_time_ms: u64,
    /// Mark each message as read before dispatching it.
    pub mark_message: bool,
    /// Keep the at-mention of the bot in the content.
    pub keep_at_me_message: bool,
    /// Put a space after the at-mention when replying with one.
    pub at_space: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            nickname: Vec::new(),
            command_prefix: "/".into(),
            super_users: Vec::new(),
            ring_len: 0,
            latency_ms: 0,
            max_process_time_ms: 4 * 60 * 1000,
            mark_message: false,
            keep_at_me_message: false,
            at_space: false,
        }
    }
}

impl BotConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    pub fn max_process_time(&self) -> Duration {
        Duration::from_millis(self.max_process_time_ms)
    }

    pub fn is_super_user(&self, user_id: i64) -> bool {
        self.super_users.contains(&user_id)
    }

    /// The first of `candidates` that is a super user, in configured order.
    pub fn first_super_user(&self, candidates: &[i64]) -> Option<i64> {
        self.super_users
            .iter()
            .copied()
            .find(|id| candidates.contains(id))
    }
}
