//! The dispatch engine.
//!
//! One dispatch pass runs per inbound event:
//!
//! 1. Optionally mark the message as read (fire and forget).
//! 2. Take one snapshot of the registered matchers.
//! 3. For each matcher whose type guard accepts the event, build a fresh
//!    [`Context`] and run pre-handlers, rules and mid-handlers. A `false`
//!    (or a panic) skips to the next matcher, or ends the pass if the
//!    break flag is set.
//! 4. Run the handler, deregister a temp matcher, run post-handlers, and
//!    end the pass if the block flag is set.
//!
//! Every stage runs as its own task raced against one deadline shared by
//! the whole pass. Missing the deadline ends the pass unless the current
//! matcher has no-timeout set, in which case the deadline is reset.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bronze_core::{
    ApiCaller, ApiRequest, ApiResponse, ApiResult, BotConfig, Event, EventSink, MessageId,
};
use futures::future::BoxFuture;
use tokio::task::JoinError;
use tokio::time::{Instant, Sleep};
use tracing::{debug, error, trace, warn};

use crate::bot::Bot;
use crate::context::Context;
use crate::ingest::EventRing;
use crate::registry::MatcherRegistry;
use crate::triggered::TriggeredMessages;

/// How a dispatch pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every matcher was visited.
    Exhausted,
    /// A failed stage on a break matcher ended the pass.
    Broken,
    /// A block matcher fully succeeded.
    Blocked,
    /// A stage missed the deadline.
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Pre,
    Rule,
    Mid,
    Handler,
    Post,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pre => "pre",
            Self::Rule => "rule",
            Self::Mid => "mid",
            Self::Handler => "handler",
            Self::Post => "post",
        })
    }
}

enum StageResult<T> {
    Done(T),
    Faulted,
    TimedOut,
}

struct DispatcherInner {
    registry: Arc<MatcherRegistry>,
    config: BotConfig,
    triggered: Arc<TriggeredMessages>,
    ring: Option<Arc<EventRing>>,
    started: AtomicBool,
}

/// Runs dispatch passes against a [`MatcherRegistry`].
///
/// Cheap to clone. With `ring_len > 0` events submitted through
/// [`submit`](Dispatcher::submit) queue in a bounded buffer drained by the
/// task spawned in [`start`](Dispatcher::start), one event per `latency`
/// tick (at least one millisecond). Otherwise each event gets its own task
/// right away, delayed by `latency` when set.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new(registry: Arc<MatcherRegistry>, config: BotConfig) -> Self {
        let ring = (config.ring_len > 0).then(|| Arc::new(EventRing::new(config.ring_len)));
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                config,
                triggered: Arc::new(TriggeredMessages::default()),
                ring,
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<MatcherRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &BotConfig {
        &self.inner.config
    }

    /// Spawns the buffer drain task. Does nothing without a buffer or when
    /// already started. Must be called inside a Tokio runtime.
    pub fn start(&self) {
        let Some(ring) = self.inner.ring.clone() else {
            return;
        };
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let tick = self.config().latency().max(Duration::from_millis(1));
        let dispatcher = self.clone();
        tokio::spawn(async move {
            while let Some((payload, caller)) = ring.pop().await {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.process(payload, caller).await;
                });
                tokio::time::sleep(tick).await;
            }
            debug!("event ring closed");
        });
    }

    /// Stops the buffer drain task; queued events are discarded.
    pub fn shutdown(&self) {
        if let Some(ring) = &self.inner.ring {
            ring.close();
        }
    }

    /// An [`EventSink`] feeding this dispatcher, for drivers.
    pub fn sink(&self) -> EventSink {
        let dispatcher = self.clone();
        Arc::new(move |payload: Vec<u8>, caller: Arc<dyn ApiCaller>| {
            dispatcher.submit(payload, caller)
        })
    }

    /// Queues or spawns dispatch of a raw event payload.
    pub fn submit(&self, payload: Vec<u8>, caller: Arc<dyn ApiCaller>) {
        if let Some(ring) = &self.inner.ring {
            ring.push(payload, caller);
            return;
        }
        let dispatcher = self.clone();
        let latency = self.config().latency();
        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            dispatcher.process(payload, caller).await;
        });
    }

    /// Parses, normalizes and dispatches one raw event payload.
    pub async fn process(
        &self,
        payload: Vec<u8>,
        caller: Arc<dyn ApiCaller>,
    ) -> Option<PassOutcome> {
        match Event::from_payload(&payload, caller.self_id(), self.config()) {
            Ok(event) => Some(self.dispatch(event, caller).await),
            Err(e) => {
                warn!(bot_id = caller.self_id(), error = %e, "failed to parse event");
                None
            }
        }
    }

    /// Runs one dispatch pass for a normalized event.
    pub async fn dispatch(&self, event: Event, transport: Arc<dyn ApiCaller>) -> PassOutcome {
        let event = Arc::new(event);
        let caller: Arc<dyn ApiCaller> = match &event.message_id {
            Some(id) => Arc::new(RecordingCaller {
                trigger: id.clone(),
                inner: transport.clone(),
                triggered: self.inner.triggered.clone(),
            }),
            None => transport.clone(),
        };

        if self.config().mark_message && event.is_message() {
            if let Some(id) = event.message_id.clone() {
                let bot = Bot::new(transport.clone());
                tokio::spawn(async move {
                    if let Err(e) = bot.mark_message_as_read(&id).await {
                        debug!(message_id = %id, error = %e, "failed to mark message as read");
                    }
                });
            }
        }

        let matchers = self.registry().snapshot();
        let max_wait = self.config().max_process_time();
        let deadline = tokio::time::sleep(max_wait);
        tokio::pin!(deadline);

        'matchers: for matcher in matchers.iter() {
            if !matcher.accepts(&event) {
                continue;
            }
            trace!(matcher = matcher.get_name(), "evaluating matcher");

            let ctx = Arc::new(Context::new(
                event.clone(),
                caller.clone(),
                transport.clone(),
                matcher.clone(),
                self.clone(),
            ));
            let stages = matcher
                .shared_engine()
                .map(|engine| engine.stages())
                .unwrap_or_default();

            let rules = stages
                .pre
                .iter()
                .map(|rule| (Stage::Pre, rule))
                .chain(matcher.own_rules().iter().map(|rule| (Stage::Rule, rule)))
                .chain(stages.mid.iter().map(|rule| (Stage::Mid, rule)));
            for (stage, rule) in rules {
                match run_stage(stage, rule, &ctx, &mut deadline, max_wait).await {
                    StageResult::Done(true) => {}
                    StageResult::Done(false) | StageResult::Faulted => {
                        if ctx.is_break() {
                            debug!(
                                matcher = matcher.get_name(),
                                %stage,
                                "stage failed, breaking the pass"
                            );
                            return PassOutcome::Broken;
                        }
                        continue 'matchers;
                    }
                    StageResult::TimedOut => return PassOutcome::TimedOut,
                }
            }

            if let Some(handler) = matcher.handler() {
                let result =
                    run_stage(Stage::Handler, handler, &ctx, &mut deadline, max_wait).await;
                if matches!(result, StageResult::TimedOut) {
                    return PassOutcome::TimedOut;
                }
            }

            if matcher.is_temp() {
                self.registry().remove(matcher.id());
            }

            for post in &stages.post {
                let result = run_stage(Stage::Post, post, &ctx, &mut deadline, max_wait).await;
                if matches!(result, StageResult::TimedOut) {
                    return PassOutcome::TimedOut;
                }
            }

            if ctx.is_block() {
                debug!(matcher = matcher.get_name(), "matcher blocked the pass");
                return PassOutcome::Blocked;
            }
        }

        PassOutcome::Exhausted
    }

    /// Reply ids recorded for the message `id` in the last five minutes.
    pub fn triggered_messages(&self, id: &MessageId) -> Vec<MessageId> {
        self.inner.triggered.get(id)
    }
}

/// A stage callback: a [`Rule`](crate::handler::Rule) or a
/// [`Handler`](crate::handler::Handler).
type StageFn<T> = Arc<dyn Fn(Arc<Context>) -> BoxFuture<'static, T> + Send + Sync>;

/// Runs `callback` on its own task and waits for it or the pass deadline,
/// whichever is first.
///
/// The callback itself is invoked inside the task, so a panic in its
/// synchronous part is contained the same way as one in its future.
async fn run_stage<T: Send + 'static>(
    stage: Stage,
    callback: &StageFn<T>,
    ctx: &Arc<Context>,
    deadline: &mut std::pin::Pin<&mut Sleep>,
    max_wait: Duration,
) -> StageResult<T> {
    let callback = callback.clone();
    let task_ctx = ctx.clone();
    let mut task = tokio::spawn(async move { callback(task_ctx).await });
    loop {
        tokio::select! {
            biased;
            joined = &mut task => {
                return match joined {
                    Ok(value) => StageResult::Done(value),
                    Err(e) => {
                        error!(
                            matcher = ctx.matcher().get_name(),
                            %stage,
                            panic = %panic_message(e),
                            "stage panicked"
                        );
                        StageResult::Faulted
                    }
                };
            }
            () = deadline.as_mut() => {
                if ctx.is_no_timeout() {
                    deadline.as_mut().reset(Instant::now() + max_wait);
                    continue;
                }
                warn!(
                    matcher = ctx.matcher().get_name(),
                    %stage,
                    "stage missed the pass deadline, abandoning the pass"
                );
                return StageResult::TimedOut;
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Records ids of messages sent while handling a message.
struct RecordingCaller {
    trigger: MessageId,
    inner: Arc<dyn ApiCaller>,
    triggered: Arc<TriggeredMessages>,
}

#[async_trait]
impl ApiCaller for RecordingCaller {
    async fn call_api(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let is_send = request.action.starts_with("send_");
        let response = self.inner.call_api(request).await?;
        if is_send {
            let sent = response
                .data
                .get("message_id")
                .and_then(|id| serde_json::from_value::<MessageId>(id.clone()).ok());
            if let Some(sent) = sent {
                self.triggered.record(self.trigger.clone(), sent);
            }
        }
        Ok(response)
    }

    fn self_id(&self) -> i64 {
        self.inner.self_id()
    }

    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }
}
