//! Replies sent in response to a message, kept for a while.

use std::time::Duration;

use bronze_core::MessageId;
use dashmap::DashMap;
use tokio::time::Instant;

/// How long reply ids are remembered.
pub const TRIGGERED_TTL: Duration = Duration::from_secs(5 * 60);

/// Message ids sent while handling a message, keyed by that message's id.
pub struct TriggeredMessages {
    entries: DashMap<MessageId, (Instant, Vec<MessageId>)>,
    ttl: Duration,
}

impl Default for TriggeredMessages {
    fn default() -> Self {
        Self::with_ttl(TRIGGERED_TTL)
    }
}

impl TriggeredMessages {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Appends `reply` to the list for `trigger` and refreshes its expiry.
    pub fn record(&self, trigger: MessageId, reply: MessageId) {
        self.purge_expired();
        let mut entry = self
            .entries
            .entry(trigger)
            .or_insert_with(|| (Instant::now(), Vec::new()));
        entry.0 = Instant::now();
        entry.1.push(reply);
    }

    pub fn get(&self, trigger: &MessageId) -> Vec<MessageId> {
        let expired = match self.entries.get(trigger) {
            Some(entry) if entry.0.elapsed() < self.ttl => return entry.1.clone(),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(trigger);
        }
        Vec::new()
    }

    fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (at, _)| at.elapsed() < ttl);
    }
}
