//! Stage lists shared by a group of matchers.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::handler::{Handler, Rule};
use crate::matcher::Matcher;

/// Pre, mid and post stages shared by every matcher built from one engine.
///
/// Pre-handlers run before a matcher's own rules, mid-handlers after them,
/// and post-handlers after its handler. Each list runs in registration
/// order.
#[derive(Default)]
pub struct Engine {
    pre: RwLock<Vec<Rule>>,
    mid: RwLock<Vec<Rule>>,
    post: RwLock<Vec<Handler>>,
}

/// One consistent copy of an engine's stage lists.
#[derive(Default, Clone)]
pub(crate) struct EngineStages {
    pub pre: Vec<Rule>,
    pub mid: Vec<Rule>,
    pub post: Vec<Handler>,
}

impl Engine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn use_pre_handler(&self, rule: Rule) {
        self.pre.write().push(rule);
    }

    pub fn use_mid_handler(&self, rule: Rule) {
        self.mid.write().push(rule);
    }

    pub fn use_post_handler(&self, handler: Handler) {
        self.post.write().push(handler);
    }

    /// A fresh matcher bound to this engine.
    pub fn matcher(self: &Arc<Self>) -> Matcher {
        Matcher::new().engine(self.clone())
    }

    pub(crate) fn stages(&self) -> EngineStages {
        EngineStages {
            pre: self.pre.read().clone(),
            mid: self.mid.read().clone(),
            post: self.post.read().clone(),
        }
    }
}
