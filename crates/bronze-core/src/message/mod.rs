//! Message content and identifiers.

mod id;
mod segment;

pub use id::{MessageId, synthesize_id};
pub use segment::{Content, Segment, escape_cq_text, escape_cq_value, unescape_cq_text};
