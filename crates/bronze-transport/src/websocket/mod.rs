//! WebSocket drivers.

#[cfg(feature = "ws-client")]
mod client;
#[cfg(feature = "ws-client")]
pub use client::{WsClientCaller, WsClientDriver};

#[cfg(feature = "ws-server")]
mod server;
#[cfg(feature = "ws-server")]
pub use server::{WsServerCaller, WsServerDriver};

use std::time::Duration;

use bronze_core::{TransportError, TransportResult};
use serde_json::Value;

/// Pause after a dropped connection before dialing again.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3);

/// Reads the peer's self id from the first frame of a connection.
pub(crate) fn parse_handshake(frame: &str) -> TransportResult<i64> {
    let value: Value = serde_json::from_str(frame).map_err(|e| TransportError::HandshakeFailed {
        reason: format!("first frame is not JSON: {e}"),
    })?;
    let self_id = match value.get("self_id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    self_id.ok_or_else(|| TransportError::HandshakeFailed {
        reason: "first frame carries no self_id".into(),
    })
}
