//! Inbound events and their normalization.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::BotConfig;
use crate::message::{Content, MessageId, synthesize_id};

/// The author of a message as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub card: String,
    #[serde(default)]
    pub role: String,
}

impl Sender {
    /// Group card if set, nickname otherwise.
    pub fn name(&self) -> &str {
        if self.card.is_empty() {
            &self.nickname
        } else {
            &self.card
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.user_id)
    }
}

/// A normalized inbound event.
///
/// Built once by [`Event::from_payload`] and shared read-only by every
/// matcher of the dispatch pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub post_type: String,
    /// `message_type`, `notice_type` or `request_type`, by post type.
    #[serde(skip)]
    pub detail_type: String,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub notice_type: String,
    #[serde(default)]
    pub request_type: String,
    #[serde(default)]
    pub meta_event_type: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub self_id: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub user_id: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub group_id: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub target_id: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub operator_id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub guild_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tiny_id: String,
    #[serde(default, rename = "message_id", skip_serializing)]
    raw_message_id: Value,
    #[serde(skip)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub message: Content,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub flag: String,
    /// Whether the event addresses this bot.
    #[serde(skip)]
    pub is_to_me: bool,
    /// The payload as received.
    #[serde(skip)]
    pub raw: Value,
}

impl Event {
    /// Parses and normalizes one event payload.
    ///
    /// `self_id` is the id of the peer the payload arrived from and is used
    /// when the payload does not name one.
    pub fn from_payload(
        payload: &[u8],
        self_id: i64,
        config: &BotConfig,
    ) -> Result<Self, serde_json::Error> {
        let raw: Value = serde_json::from_slice(payload)?;
        let mut event: Event = serde_json::from_value(raw.clone())?;
        event.raw = raw;
        if event.self_id == 0 {
            event.self_id = self_id;
        }
        event.normalize(config);
        Ok(event)
    }

    fn normalize(&mut self, config: &BotConfig) {
        self.derive_message_id();

        match self.post_type.as_str() {
            "message" | "message_sent" => self.detail_type = self.message_type.clone(),
            "notice" => {
                self.detail_type = self.notice_type.clone();
                self.is_to_me = match self.sub_type.as_str() {
                    "poke" | "lucky_king" => self.target_id == self.self_id,
                    _ => self.user_id == self.self_id,
                };
            }
            "request" => self.detail_type = self.request_type.clone(),
            _ => {}
        }

        if self.post_type == "message" {
            self.normalize_message(config);
        }
    }

    fn derive_message_id(&mut self) {
        let numeric = match &self.raw_message_id {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        if let Some(id) = numeric {
            self.message_id = Some(MessageId::from_i64(id));
            return;
        }
        let Value::String(opaque) = &self.raw_message_id else {
            return;
        };
        self.message_id = Some(MessageId::from_string(opaque.as_str()));

        if self.message_type == "guild" {
            self.group_id = synthesize_id(&[self.guild_id.as_str(), self.channel_id.as_str()]);
            self.user_id = synthesize_id(&[self.tiny_id.as_str()]);
            if let Some(sender) = &mut self.sender {
                sender.user_id = self.user_id;
            }
        }
    }

    fn normalize_message(&mut self, config: &BotConfig) {
        let segments = self.message.segments_mut();
        for i in 1..segments.len() {
            if segments[i - 1].kind == "at" {
                if let Some(text) = segments[i].text_mut() {
                    *text = text.trim_start_matches(' ').to_string();
                }
            }
        }
        segments.retain(|segment| segment.as_text() != Some(""));

        let sender = self.sender.clone().unwrap_or_default();
        let detail_type = self.detail_type.clone();
        match detail_type.as_str() {
            "group" => {
                info!(
                    group_id = self.group_id,
                    sender = %sender,
                    "received group message: {}",
                    self.message.cq_code()
                );
                self.is_to_me = self.addressed_to_me(config);
            }
            "guild" if self.sub_type == "channel" => {
                info!(
                    group_id = self.group_id,
                    guild_id = %self.guild_id,
                    channel_id = %self.channel_id,
                    sender = %sender,
                    "received channel message: {}",
                    self.message.cq_code()
                );
                self.is_to_me = self.addressed_to_me(config);
            }
            _ => {
                info!(sender = %sender, "received direct message: {}", self.message.cq_code());
                // Strip a leading nickname, but direct messages always count.
                self.addressed_to_me(config);
                self.is_to_me = true;
            }
        }

        if let Some(text) = self.message.segments_mut().first_mut().and_then(|s| s.text_mut()) {
            *text = text.trim_start_matches(' ').to_string();
        }
    }

    /// Looks for an at-mention of the bot, then for a leading nickname,
    /// stripping whichever matched.
    fn addressed_to_me(&mut self, config: &BotConfig) -> bool {
        let self_id = self.self_id;
        let segments = self.message.segments_mut();

        let mention = segments.iter().position(|segment| {
            segment.kind == "at"
                && segment.get("qq").and_then(|qq| qq.parse::<i64>().ok()) == Some(self_id)
        });
        if let Some(index) = mention {
            if !config.keep_at_me_message {
                segments.remove(index);
            }
            return true;
        }

        let Some(text) = segments.first_mut().and_then(|s| s.text_mut()) else {
            return false;
        };
        *text = text.trim_start_matches(' ').to_string();
        let nickname = config
            .nickname
            .iter()
            .find(|name| !name.is_empty() && text.starts_with(name.as_str()));
        match nickname {
            Some(name) => {
                *text = text[name.len()..].to_string();
                true
            }
            None => false,
        }
    }

    /// The platform-specific sub type matching `post_type`.
    pub fn detail_type(&self) -> &str {
        &self.detail_type
    }

    pub fn is_message(&self) -> bool {
        self.post_type == "message"
    }

    /// The sender's id, falling back to the event's user id.
    pub fn sender_id(&self) -> i64 {
        self.sender
            .as_ref()
            .map(|s| s.user_id)
            .filter(|id| *id != 0)
            .unwrap_or(self.user_id)
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().unwrap_or_default(),
        Value::String(s) => s.parse().unwrap_or_default(),
        _ => 0,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Segment;

    fn config() -> BotConfig {
        BotConfig {
            nickname: vec!["bot".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_group_at_mention_is_stripped() {
        let payload = br#"{"post_type":"message","message_type":"group","message_id":"123","self_id":10,
            "message":[{"type":"at","data":{"qq":"10"}},{"type":"text","data":{"text":"  hello"}}]}"#;
        let event = Event::from_payload(payload, 10, &config()).unwrap();

        assert!(event.is_to_me);
        assert_eq!(event.detail_type(), "group");
        assert_eq!(event.message.segments(), &[Segment::text("hello")]);
        assert_eq!(event.message_id, Some(MessageId::from_i64(123)));
    }

    #[test]
    fn test_self_id_falls_back_to_peer() {
        let payload = br#"{"post_type":"message","message_type":"group","message_id":1,
            "message":"[CQ:at,qq=10] hi"}"#;
        let event = Event::from_payload(payload, 10, &config()).unwrap();
        assert_eq!(event.self_id, 10);
        assert!(event.is_to_me);
        assert_eq!(event.message.extract_plain_text(), "hi");
    }

    #[test]
    fn test_keep_at_me_message() {
        let payload = br#"{"post_type":"message","message_type":"group","self_id":10,
            "message":[{"type":"at","data":{"qq":"10"}},{"type":"text","data":{"text":" x"}}]}"#;
        let config = BotConfig {
            keep_at_me_message: true,
            ..config()
        };
        let event = Event::from_payload(payload, 10, &config).unwrap();
        assert!(event.is_to_me);
        assert_eq!(event.message.len(), 2);
    }

    #[test]
    fn test_direct_nickname_prefix() {
        let payload = br#"{"post_type":"message","message_type":"private","self_id":10,"user_id":5,
            "message":[{"type":"text","data":{"text":"bot hello"}}]}"#;
        let event = Event::from_payload(payload, 10, &config()).unwrap();
        assert!(event.is_to_me);
        assert_eq!(event.message.extract_plain_text(), "hello");
    }

    #[test]
    fn test_group_without_mention_is_not_to_me() {
        let payload = br#"{"post_type":"message","message_type":"group","self_id":10,
            "message":[{"type":"at","data":{"qq":"11"}},{"type":"text","data":{"text":" "}}]}"#;
        let event = Event::from_payload(payload, 10, &config()).unwrap();
        assert!(!event.is_to_me);
        assert_eq!(event.message.len(), 1);
    }

    #[test]
    fn test_guild_ids_are_synthesized() {
        let payload = br#"{"post_type":"message","message_type":"guild","sub_type":"channel",
            "self_id":10,"message_id":"BAC3HLRYvXdY","guild_id":"49428","channel_id":"123",
            "tiny_id":"1442","sender":{"user_id":"1442","nickname":"n"},"message":"hi"}"#;
        let event = Event::from_payload(payload, 10, &config()).unwrap();

        assert_eq!(event.message_id.as_ref().map(MessageId::as_str), Some("BAC3HLRYvXdY"));
        assert_eq!(event.group_id, synthesize_id(&["49428", "123"]));
        assert_eq!(event.user_id, synthesize_id(&["1442"]));
        assert_eq!(event.sender_id(), event.user_id);
        assert!(event.group_id >= 1 << 32);
        assert!(!event.is_to_me);
    }

    #[test]
    fn test_notice_addressing() {
        let poke = br#"{"post_type":"notice","notice_type":"notify","sub_type":"poke",
            "self_id":10,"user_id":3,"target_id":10}"#;
        let event = Event::from_payload(poke, 10, &config()).unwrap();
        assert_eq!(event.detail_type(), "notify");
        assert!(event.is_to_me);

        let ban = br#"{"post_type":"notice","notice_type":"group_ban","sub_type":"ban",
            "self_id":10,"user_id":3,"target_id":10}"#;
        let event = Event::from_payload(ban, 10, &config()).unwrap();
        assert!(!event.is_to_me);
    }
}
