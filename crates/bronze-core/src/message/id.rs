//! Message identifiers and checksum-derived ids.

use std::fmt;
use std::hash::{Hash, Hasher};

use crc::{CRC_64_GO_ISO, Crc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Derives a positive id from a sequence of string keys.
///
/// The result is a 64-bit checksum with the sign bit cleared. Values whose
/// high 32 bits would be zero get bit 32 forced on, so a derived id never
/// lands in `[0, 2^32)` where the platform's native ids live.
pub fn synthesize_id<K: AsRef<str>>(keys: &[K]) -> i64 {
    let mut digest = CRC64.digest();
    for key in keys {
        digest.update(key.as_ref().as_bytes());
    }
    let mut id = digest.finalize() & 0x7fff_ffff_ffff_ffff;
    if id <= 0xffff_ffff {
        id |= 0x1_0000_0000;
    }
    id as i64
}

/// A message identifier carried in both integer and string form.
///
/// Platforms address most messages numerically, but bridged guild messages
/// use opaque strings. The string form is canonical: equality and hashing
/// use it, and serialization emits a JSON string whenever it is not the
/// decimal rendering of the integer form.
#[derive(Debug, Clone, Eq)]
pub struct MessageId {
    int: i64,
    text: String,
}

impl MessageId {
    pub fn from_i64(id: i64) -> Self {
        Self {
            int: id,
            text: id.to_string(),
        }
    }

    /// Builds an id from its string form, deriving the integer form with
    /// [`synthesize_id`] when the string is not a decimal integer.
    pub fn from_string(id: impl Into<String>) -> Self {
        let text = id.into();
        let int = text
            .parse::<i64>()
            .unwrap_or_else(|_| synthesize_id(&[text.as_str()]));
        Self { int, text }
    }

    pub fn as_i64(&self) -> i64 {
        self.int
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns true when the string form is exactly the integer form.
    pub fn is_numeric(&self) -> bool {
        self.text == self.int.to_string()
    }
}

impl PartialEq for MessageId {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Hash for MessageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self::from_i64(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::from_string(id)
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_numeric() {
            serializer.serialize_i64(self.int)
        } else {
            serializer.serialize_str(&self.text)
        }
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = MessageId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer or string message id")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<MessageId, E> {
                Ok(MessageId::from_i64(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<MessageId, E> {
                i64::try_from(v)
                    .map(MessageId::from_i64)
                    .map_err(|_| E::custom(format!("message id {v} out of range")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<MessageId, E> {
                Ok(MessageId::from_string(v))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_round_trip() {
        for n in [0, 1, -1, 42, i64::MIN, i64::MAX, 0xffff_ffff, 1 << 40] {
            let id = MessageId::from_i64(n);
            assert_eq!(MessageId::from_string(id.as_str()).as_i64(), n);
            assert!(id.is_numeric());
        }
    }

    #[test]
    fn test_string_id_is_deterministic_and_outside_native_range() {
        let a = MessageId::from_string("guild-msg-abc");
        let b = MessageId::from_string("guild-msg-abc");
        assert_eq!(a.as_i64(), b.as_i64());
        assert!(!a.is_numeric());
        assert!(a.as_i64() >= 1 << 32);
        assert_ne!(a, MessageId::from_string("guild-msg-abd"));
    }

    #[test]
    fn test_synthesized_ids_never_hit_native_space() {
        for i in 0..2000 {
            let guild = format!("guild{i}");
            let channel = format!("{}", i * 7919);
            let id = synthesize_id(&[guild.as_str(), channel.as_str()]);
            assert!(id > 0);
            assert!(id >= 1 << 32, "{guild}/{channel} -> {id}");
            let tiny = synthesize_id(&[channel.as_str()]);
            assert!(tiny >= 1 << 32);
        }
        assert_eq!(synthesize_id(&["a", "b"]), synthesize_id(&["ab"]));
    }

    #[test]
    fn test_serialization_prefers_string_form() {
        let numeric = MessageId::from_i64(123);
        assert_eq!(serde_json::to_string(&numeric).unwrap(), "123");

        let opaque = MessageId::from_string("abc");
        assert_eq!(serde_json::to_string(&opaque).unwrap(), "\"abc\"");

        let padded = MessageId::from_string("007");
        assert_eq!(padded.as_i64(), 7);
        assert_eq!(serde_json::to_string(&padded).unwrap(), "\"007\"");

        let parsed: MessageId = serde_json::from_str("\"123\"").unwrap();
        assert_eq!(parsed, numeric);
        let parsed: MessageId = serde_json::from_str("-5").unwrap();
        assert_eq!(parsed.as_i64(), -5);
    }
}
