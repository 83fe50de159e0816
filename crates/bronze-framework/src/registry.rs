//! The copy-on-write list of registered matchers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::matcher::Matcher;

/// Registered matchers in registration order.
///
/// Mutations edit a master list and mark it dirty. [`snapshot`] republishes
/// the master as an immutable slice when dirty, so a dispatch pass holds
/// one consistent list for its whole run and never sees changes made while
/// it executes.
///
/// [`snapshot`]: MatcherRegistry::snapshot
pub struct MatcherRegistry {
    master: Mutex<Vec<Matcher>>,
    dirty: AtomicBool,
    published: RwLock<Arc<[Matcher]>>,
    next_id: AtomicU64,
}

impl Default for MatcherRegistry {
    fn default() -> Self {
        Self {
            master: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(false),
            published: RwLock::new(Arc::from(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl MatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `matcher` and returns it with its assigned id.
    pub fn register(&self, matcher: Matcher) -> Matcher {
        let matcher = matcher.with_id(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut master = self.master.lock();
        master.push(matcher.clone());
        self.dirty.store(true, Ordering::Release);
        debug!(matcher = matcher.get_name(), id = matcher.id(), "registered matcher");
        matcher
    }

    /// Removes the matcher with `id`. Returns false if it was not registered.
    pub fn remove(&self, id: u64) -> bool {
        let mut master = self.master.lock();
        let before = master.len();
        master.retain(|m| m.id() != id);
        let removed = master.len() != before;
        if removed {
            self.dirty.store(true, Ordering::Release);
            debug!(id, "removed matcher");
        }
        removed
    }

    /// The current list, republished first if it changed.
    pub fn snapshot(&self) -> Arc<[Matcher]> {
        if self.dirty.load(Ordering::Acquire) {
            let master = self.master.lock();
            // Publish before clearing, so a reader that sees the flag clear
            // also sees the new list.
            if self.dirty.load(Ordering::Acquire) {
                *self.published.write() = Arc::from(master.as_slice());
                self.dirty.store(false, Ordering::Release);
            }
        }
        self.published.read().clone()
    }

    pub fn len(&self) -> usize {
        self.master.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.master.lock().is_empty()
    }
}
