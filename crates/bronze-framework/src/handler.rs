//! Stage callbacks.
//!
//! Every stage of a matcher is a callback taking the pass context. Rules
//! (pre-handlers, rule predicates, mid-handlers) resolve to a `bool`;
//! handlers (the terminal handler and post-handlers) resolve to `()`.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::Context;

/// A predicate stage.
pub type Rule = Arc<dyn Fn(Arc<Context>) -> BoxFuture<'static, bool> + Send + Sync>;

/// A side-effecting stage.
pub type Handler = Arc<dyn Fn(Arc<Context>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async predicate as a [`Rule`].
pub fn rule<F, Fut>(f: F) -> Rule
where
    F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(move |ctx: Arc<Context>| f(ctx).boxed())
}

/// Wraps a synchronous predicate as a [`Rule`].
pub fn check<F>(f: F) -> Rule
where
    F: Fn(&Context) -> bool + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |ctx: Arc<Context>| {
        let f = f.clone();
        async move { f(&ctx) }.boxed()
    })
}

/// Wraps an async callback as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx: Arc<Context>| f(ctx).boxed())
}
