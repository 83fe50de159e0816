//! Message segments and the content sequence built from them.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// One typed piece of a message, e.g. a run of text or an at-mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_data")]
    pub data: BTreeMap<String, String>,
}

/// Accepts scalar data values of any JSON type; implementations disagree on
/// whether ids such as `qq` are sent as numbers or strings.
fn lenient_data<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

impl Segment {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: BTreeMap::new(),
        }
    }

    /// Adds one attribute, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new("text").with("text", text)
    }

    pub fn at(user_id: i64) -> Self {
        Self::new("at").with("qq", user_id.to_string())
    }

    pub fn face(id: i32) -> Self {
        Self::new("face").with("id", id.to_string())
    }

    /// An image by URL, path or `base64://` payload.
    pub fn image(file: impl Into<String>) -> Self {
        Self::new("image").with("file", file)
    }

    pub fn reply(message_id: impl fmt::Display) -> Self {
        Self::new("reply").with("id", message_id.to_string())
    }

    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// The text of a text segment.
    pub fn as_text(&self) -> Option<&str> {
        if self.is_text() { self.get("text") } else { None }
    }

    pub fn text_mut(&mut self) -> Option<&mut String> {
        if self.is_text() {
            self.data.get_mut("text")
        } else {
            None
        }
    }

    fn write_cq(&self, out: &mut String, hash_images: bool) {
        if let Some(text) = self.as_text() {
            out.push_str(&escape_cq_text(text));
            return;
        }
        out.push_str("[CQ:");
        out.push_str(&self.kind);
        for (key, value) in &self.data {
            out.push(',');
            out.push_str(key);
            out.push('=');
            match (self.kind.as_str(), value.strip_prefix("base64://")) {
                ("node", _) => out.push_str(value),
                ("image", Some(encoded)) if hash_images => {
                    match STANDARD.decode(encoded) {
                        Ok(bytes) => out.push_str(&hex::encode(Sha256::digest(&bytes))),
                        Err(err) => {
                            let _ = write!(out, "{err}");
                        }
                    }
                    out.push_str(".image");
                }
                _ => out.push_str(&escape_cq_value(value)),
            }
        }
        out.push(']');
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_cq(&mut out, false);
        f.write_str(&out)
    }
}

// =============================================================================
// Content
// =============================================================================

/// An ordered sequence of segments.
///
/// Deserializes from either wire form: a segment array or a CQ-code string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Content(Vec<Segment>);

impl Content {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a CQ-code string such as `hi [CQ:at,qq=10]`.
    pub fn parse_cq(input: &str) -> Self {
        Self(parse_cq_string(input))
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn segments_mut(&mut self) -> &mut Vec<Segment> {
        &mut self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenates the text of every text segment.
    pub fn extract_plain_text(&self) -> String {
        self.0.iter().filter_map(Segment::as_text).collect()
    }

    /// Renders for log output. Base64 images are replaced by the sha256 of
    /// their bytes, so this form cannot be sent back to the platform.
    pub fn cq_code(&self) -> String {
        let mut out = String::new();
        for segment in &self.0 {
            segment.write_cq(&mut out, true);
        }
        out
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for segment in &self.0 {
            segment.write_cq(&mut out, false);
        }
        f.write_str(&out)
    }
}

impl From<Vec<Segment>> for Content {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl From<Segment> for Content {
    fn from(segment: Segment) -> Self {
        Self(vec![segment])
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self(vec![Segment::text(text)])
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self(vec![Segment::text(text)])
    }
}

impl FromIterator<Segment> for Content {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Content {
    type Item = Segment;
    type IntoIter = std::vec::IntoIter<Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Self::new()),
            Value::String(s) => Ok(Self::parse_cq(&s)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| serde_json::from_value(item).map_err(serde::de::Error::custom))
                .collect(),
            obj @ Value::Object(_) => serde_json::from_value(obj)
                .map(|segment: Segment| Self(vec![segment]))
                .map_err(serde::de::Error::custom),
            other => Err(serde::de::Error::custom(format!(
                "unsupported message content: {other}"
            ))),
        }
    }
}

// =============================================================================
// CQ codes
// =============================================================================

pub fn escape_cq_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('[', "&#91;")
        .replace(']', "&#93;")
}

pub fn escape_cq_value(value: &str) -> String {
    escape_cq_text(value).replace(',', "&#44;")
}

pub fn unescape_cq_text(text: &str) -> String {
    text.replace("&#44;", ",")
        .replace("&#91;", "[")
        .replace("&#93;", "]")
        .replace("&amp;", "&")
}

fn parse_cq_string(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        let Some(start) = rest.find("[CQ:") else {
            push_text(&mut segments, rest);
            break;
        };
        push_text(&mut segments, &rest[..start]);

        let body = &rest[start + 4..];
        let Some(end) = body.find(']') else {
            // Unterminated code; keep it verbatim.
            push_text(&mut segments, &rest[start..]);
            break;
        };

        let mut parts = body[..end].split(',');
        let mut segment = Segment::new(parts.next().unwrap_or_default().trim());
        for part in parts {
            if let Some((key, value)) = part.split_once('=') {
                segment.data.insert(key.to_string(), unescape_cq_text(value));
            }
        }
        segments.push(segment);
        rest = &body[end + 1..];
    }

    segments
}

fn push_text(segments: &mut Vec<Segment>, raw: &str) {
    if !raw.is_empty() {
        segments.push(Segment::text(unescape_cq_text(raw)));
    }
}
