//! The per-matcher context of one dispatch pass.
//!
//! A [`Context`] is created each time a matcher's type guard accepts an
//! event. It holds the shared event, the reply target, a copy of the
//! matcher's control flags that stages may flip, and scratch state that
//! starts empty for every matcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use bronze_core::{ApiCaller, ApiResult, BotConfig, Content, Event, MessageId, Segment};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::bot::Bot;
use crate::dispatcher::Dispatcher;
use crate::error::DecodeResult;
use crate::handler::{Rule, check};
use crate::matcher::Matcher;

pub struct Context {
    event: Arc<Event>,
    bot: Bot,
    transport: Arc<dyn ApiCaller>,
    matcher: Matcher,
    dispatcher: Dispatcher,
    block: AtomicBool,
    break_pass: AtomicBool,
    no_timeout: AtomicBool,
    state: Mutex<Map<String, Value>>,
    message_string: OnceLock<String>,
}

impl Context {
    pub(crate) fn new(
        event: Arc<Event>,
        caller: Arc<dyn ApiCaller>,
        transport: Arc<dyn ApiCaller>,
        matcher: Matcher,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            block: AtomicBool::new(matcher.is_block()),
            break_pass: AtomicBool::new(matcher.is_break()),
            no_timeout: AtomicBool::new(matcher.is_no_timeout()),
            event,
            bot: Bot::new(caller),
            transport,
            matcher,
            dispatcher,
            state: Mutex::new(Map::new()),
            message_string: OnceLock::new(),
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// The matcher this context was created for.
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// The bot the event arrived from.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    pub fn caller(&self) -> &Arc<dyn ApiCaller> {
        self.bot.caller()
    }

    /// The concrete transport behind the reply target, if it is a `T`.
    pub fn expose_caller<T: ApiCaller>(&self) -> Option<&T> {
        self.bot.expose_caller::<T>()
    }

    pub fn config(&self) -> &BotConfig {
        self.dispatcher.config()
    }

    // =========================================================================
    // Pass control
    // =========================================================================

    /// Stop the pass once this matcher fully succeeds.
    pub fn block(&self) {
        self.block.store(true, Ordering::Relaxed);
    }

    /// Stop the pass if a later stage of this matcher fails.
    pub fn break_pass(&self) {
        self.break_pass.store(true, Ordering::Relaxed);
    }

    /// Keep the pass alive however long this matcher takes.
    pub fn no_timeout(&self) {
        self.no_timeout.store(true, Ordering::Relaxed);
    }

    pub fn is_block(&self) -> bool {
        self.block.load(Ordering::Relaxed)
    }

    pub fn is_break(&self) -> bool {
        self.break_pass.load(Ordering::Relaxed)
    }

    pub fn is_no_timeout(&self) -> bool {
        self.no_timeout.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Scratch state
    // =========================================================================

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    pub fn set_state(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.lock().insert(key.into(), value.into());
    }

    pub fn remove_state(&self, key: &str) -> Option<Value> {
        self.state.lock().remove(key)
    }

    /// Projects the scratch state onto `T`, matching keys to field names.
    pub fn parse<T: DeserializeOwned>(&self) -> DecodeResult<T> {
        let state = Value::Object(self.state.lock().clone());
        Ok(serde_json::from_value(state)?)
    }

    // =========================================================================
    // Message helpers
    // =========================================================================

    /// The event's content rendered as CQ-code text, computed once.
    pub fn message_string(&self) -> &str {
        self.message_string.get_or_init(|| self.event.message.to_string())
    }

    pub fn extract_plain_text(&self) -> String {
        self.event.message.extract_plain_text()
    }

    /// Sends `message` to where the event came from: the group, the guild
    /// channel, or the sender directly.
    pub async fn send(&self, message: impl Into<Content>) -> ApiResult<MessageId> {
        let event = &self.event;
        match event.detail_type() {
            "group" => self.bot.send_group_message(event.group_id, message).await,
            "guild" if event.sub_type == "channel" => {
                self.bot
                    .send_guild_channel_message(&event.guild_id, &event.channel_id, message)
                    .await
            }
            _ => self.bot.send_private_message(event.user_id, message).await,
        }
    }

    /// Sends `message` quoting the event's message, optionally mentioning
    /// the sender first.
    pub async fn reply(
        &self,
        message: impl Into<Content>,
        at_sender: bool,
    ) -> ApiResult<MessageId> {
        let mut content = Content::new();
        if let Some(id) = &self.event.message_id {
            content.push(Segment::reply(id));
        }
        if at_sender && self.event.detail_type() != "private" {
            content.push(Segment::at(self.event.sender_id()));
            if self.config().at_space {
                content.push(Segment::text(" "));
            }
        }
        let message: Content = message.into();
        content.segments_mut().extend(message);
        self.send(content).await
    }

    /// Marks the event's message as read without waiting for the result.
    pub fn mark_this_message_as_read(&self) {
        if let Some(id) = self.event.message_id.clone() {
            let bot = self.bot.clone();
            tokio::spawn(async move {
                if let Err(e) = bot.mark_message_as_read(&id).await {
                    warn!(message_id = %id, error = %e, "failed to mark message as read");
                }
            });
        }
    }

    /// A rule that accepts only events from the same user in the same group
    /// as this context's event.
    pub fn check_session(&self) -> Rule {
        let (user_id, group_id) = (self.event.user_id, self.event.group_id);
        check(move |ctx| ctx.event().user_id == user_id && ctx.event().group_id == group_id)
    }

    /// Feeds `payload` back in as a new event from the same bot.
    pub fn echo(&self, payload: Vec<u8>) {
        self.dispatcher.submit(payload, self.transport.clone());
    }

    /// Reply ids recorded for this event's message so far.
    pub fn triggered_messages(&self) -> Vec<MessageId> {
        self.event
            .message_id
            .as_ref()
            .map(|id| self.dispatcher.triggered_messages(id))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::registry::MatcherRegistry;
    use crate::testing::MockCaller;

    const GROUP: &str = r#"{"post_type":"message","message_type":"group","message_id":42,
        "self_id":10,"user_id":5,"group_id":7,"sender":{"user_id":5},"message":"a&b"}"#;

    fn context(payload: &str, config: BotConfig) -> (Arc<Context>, Arc<MockCaller>) {
        let caller = Arc::new(MockCaller::new(10));
        let event = Event::from_payload(payload.as_bytes(), 10, &config).unwrap();
        let dispatcher = Dispatcher::new(Arc::new(MatcherRegistry::new()), config);
        let ctx = Context::new(
            Arc::new(event),
            caller.clone(),
            caller.clone(),
            Matcher::new(),
            dispatcher,
        );
        (Arc::new(ctx), caller)
    }

    #[tokio::test]
    async fn test_reply_quotes_and_mentions() {
        let config = BotConfig {
            at_space: true,
            ..Default::default()
        };
        let (ctx, caller) = context(GROUP, config);

        let sent = ctx.reply("pong", true).await.unwrap();
        assert_eq!(sent, MessageId::from_i64(100));

        let requests = caller.requests.lock();
        assert_eq!(requests[0].action, "send_group_msg");
        assert_eq!(requests[0].params["group_id"], 7);
        assert_eq!(
            requests[0].params["message"],
            json!([
                {"type": "reply", "data": {"id": "42"}},
                {"type": "at", "data": {"qq": "5"}},
                {"type": "text", "data": {"text": " "}},
                {"type": "text", "data": {"text": "pong"}},
            ])
        );
    }

    #[tokio::test]
    async fn test_private_reply_skips_mention() {
        let payload = r#"{"post_type":"message","message_type":"private","self_id":10,
            "user_id":5,"message":"hi"}"#;
        let (ctx, caller) = context(payload, BotConfig::default());

        ctx.reply("pong", true).await.unwrap();
        let requests = caller.requests.lock();
        assert_eq!(requests[0].action, "send_private_msg");
        assert_eq!(requests[0].params["user_id"], 5);
        assert_eq!(
            requests[0].params["message"],
            json!([{"type": "text", "data": {"text": "pong"}}])
        );
    }

    #[tokio::test]
    async fn test_check_session() {
        let (ctx, _) = context(GROUP, BotConfig::default());
        let session = ctx.check_session();

        let (same, _) = context(GROUP, BotConfig::default());
        assert!(session(same).await);

        let other_group = GROUP.replace(r#""group_id":7"#, r#""group_id":8"#);
        let (other, _) = context(&other_group, BotConfig::default());
        assert!(!session(other).await);
    }

    #[test]
    fn test_flags_start_from_matcher() {
        let registry = Arc::new(MatcherRegistry::new());
        let event = Event::from_payload(GROUP.as_bytes(), 10, &BotConfig::default()).unwrap();
        let caller: Arc<dyn ApiCaller> = Arc::new(MockCaller::new(10));
        let ctx = Context::new(
            Arc::new(event),
            caller.clone(),
            caller,
            Matcher::new().block(true),
            Dispatcher::new(registry, BotConfig::default()),
        );

        assert!(ctx.is_block());
        assert!(!ctx.is_break());
        ctx.break_pass();
        assert!(ctx.is_break());
        assert!(ctx.expose_caller::<MockCaller>().is_some());
    }

    #[test]
    fn test_message_string_and_state() {
        let (ctx, _) = context(GROUP, BotConfig::default());
        assert_eq!(ctx.message_string(), "a&amp;b");
        assert_eq!(ctx.extract_plain_text(), "a&b");

        ctx.set_state("n", 3);
        assert_eq!(ctx.get_state("n"), Some(json!(3)));
        assert_eq!(ctx.remove_state("n"), Some(json!(3)));
        assert!(ctx.get_state("n").is_none());
    }
}
