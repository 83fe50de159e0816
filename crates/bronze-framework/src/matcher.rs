//! Matchers: a type guard, rule predicates, a handler and control flags.
//!
//! A [`Matcher`] is an immutable definition. Registering it with a
//! [`MatcherRegistry`](crate::registry::MatcherRegistry) assigns an id; every
//! dispatch pass binds the definition to a fresh
//! [`Context`](crate::context::Context) which carries the per-pass copy of
//! the flags, so concurrent passes never share mutable state.
//!
//! # Example
//!
//! ```rust,ignore
//! use bronze_framework::{Matcher, check, handler};
//!
//! let matcher = Matcher::new()
//!     .name("ping")
//!     .guard(|event| event.is_message())
//!     .rule(check(|ctx| ctx.event().message.extract_plain_text() == "ping"))
//!     .block(true)
//!     .handle(handler(|ctx| async move {
//!         let _ = ctx.send("pong").await;
//!     }));
//! ```

use std::fmt;
use std::sync::Arc;

use bronze_core::Event;

use crate::engine::Engine;
use crate::handler::{Handler, Rule};

/// A cheap synchronous filter evaluated before any stage runs.
pub type TypeGuard = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

#[derive(Clone, Default)]
struct MatcherInner {
    name: Option<String>,
    guard: Option<TypeGuard>,
    rules: Vec<Rule>,
    handler: Option<Handler>,
    engine: Option<Arc<Engine>>,
    block: bool,
    break_pass: bool,
    no_timeout: bool,
    temp: bool,
}

/// A registered rule and handler chain.
///
/// Clones share the definition; the builder methods copy it on write.
#[derive(Clone, Default)]
pub struct Matcher {
    id: u64,
    inner: Arc<MatcherInner>,
}

impl Matcher {
    /// Creates a matcher that accepts every event and does nothing.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner_mut(&mut self) -> &mut MatcherInner {
        Arc::make_mut(&mut self.inner)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner_mut().name = Some(name.into());
        self
    }

    /// Sets the type guard. Events it rejects skip this matcher silently.
    pub fn guard<F>(mut self, f: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.inner_mut().guard = Some(Arc::new(f));
        self
    }

    /// Appends a rule predicate. Rules run in the order they are added.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.inner_mut().rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.inner_mut().rules.extend(rules);
        self
    }

    /// Sets the terminal handler.
    pub fn handle(mut self, handler: Handler) -> Self {
        self.inner_mut().handler = Some(handler);
        self
    }

    /// Attaches the shared pre, mid and post stages of `engine`.
    pub fn engine(mut self, engine: Arc<Engine>) -> Self {
        self.inner_mut().engine = Some(engine);
        self
    }

    /// Stop the pass after this matcher fully succeeds.
    pub fn block(mut self, block: bool) -> Self {
        self.inner_mut().block = block;
        self
    }

    /// Stop the pass when one of this matcher's rules fails.
    pub fn break_pass(mut self, break_pass: bool) -> Self {
        self.inner_mut().break_pass = break_pass;
        self
    }

    /// Never let the pass deadline expire while this matcher runs.
    pub fn no_timeout(mut self, no_timeout: bool) -> Self {
        self.inner_mut().no_timeout = no_timeout;
        self
    }

    /// Deregister after the first time the handler runs.
    pub fn temp(mut self, temp: bool) -> Self {
        self.inner_mut().temp = temp;
        self
    }

    pub(crate) fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// The registry id, or 0 if never registered.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn get_name(&self) -> &str {
        self.inner.name.as_deref().unwrap_or("unnamed")
    }

    pub fn accepts(&self, event: &Event) -> bool {
        self.inner.guard.as_ref().is_none_or(|guard| guard(event))
    }

    pub(crate) fn own_rules(&self) -> &[Rule] {
        &self.inner.rules
    }

    pub(crate) fn handler(&self) -> Option<&Handler> {
        self.inner.handler.as_ref()
    }

    pub(crate) fn shared_engine(&self) -> Option<&Arc<Engine>> {
        self.inner.engine.as_ref()
    }

    pub fn is_block(&self) -> bool {
        self.inner.block
    }

    pub fn is_break(&self) -> bool {
        self.inner.break_pass
    }

    pub fn is_no_timeout(&self) -> bool {
        self.inner.no_timeout
    }

    pub fn is_temp(&self) -> bool {
        self.inner.temp
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("id", &self.id)
            .field("name", &self.get_name())
            .field("rules", &self.inner.rules.len())
            .field("block", &self.inner.block)
            .field("break_pass", &self.inner.break_pass)
            .field("no_timeout", &self.inner.no_timeout)
            .field("temp", &self.inner.temp)
            .finish()
    }
}
