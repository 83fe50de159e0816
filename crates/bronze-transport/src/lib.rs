//! # Bronze Transport
//!
//! Drivers connecting the Bronze dispatcher to a OneBot implementation.
//! Each driver implements [`bronze_core::Driver`] and is gated behind a
//! feature:
//!
//! | Feature | Driver | Direction |
//! |---------|--------|-----------|
//! | `ws-client` | [`WsClientDriver`] | dials a forward WebSocket |
//! | `ws-server` | [`WsServerDriver`] | accepts reverse WebSockets |
//! | `http-client` + `http-server` | [`HttpDriver`] | POSTs calls, receives event POSTs |
//! | `full` | all of the above | |
//!
//! Duplex drivers multiplex calls over the socket with a
//! [`Correlator`](bronze_core::Correlator); the HTTP driver makes one
//! request per call. Both fail calls with the same errors after the same
//! one minute deadline.

#[cfg(any(feature = "http-client", feature = "http-server"))]
pub mod http;

#[cfg(any(feature = "ws-client", feature = "ws-server"))]
pub mod websocket;

#[cfg(feature = "ws-client")]
pub use websocket::{WsClientCaller, WsClientDriver};

#[cfg(feature = "ws-server")]
pub use websocket::{WsServerCaller, WsServerDriver};

#[cfg(all(feature = "http-client", feature = "http-server"))]
pub use http::HttpDriver;

#[cfg(feature = "http-client")]
pub use http::HttpCaller;

use std::time::Duration;

/// Wait between failed dial or bind attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// `User-Agent` sent on outbound connections.
pub const USER_AGENT: &str = concat!("Bronze/", env!("CARGO_PKG_VERSION"));

/// Splits a listen URL such as `ws://0.0.0.0:6700/onebot` into the socket
/// address and the route path. The scheme is optional; the path defaults
/// to `/`.
#[cfg(any(feature = "ws-server", feature = "http-server"))]
pub(crate) fn split_listen_url(url: &str) -> (String, String) {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    match rest.find('/') {
        Some(i) => (rest[..i].to_string(), rest[i..].to_string()),
        None => (rest.to_string(), "/".to_string()),
    }
}

#[cfg(all(test, any(feature = "ws-server", feature = "http-server")))]
mod tests {
    use super::*;

    #[test]
    fn test_split_listen_url() {
        assert_eq!(
            split_listen_url("ws://0.0.0.0:6700/onebot/v11"),
            ("0.0.0.0:6700".to_string(), "/onebot/v11".to_string())
        );
        assert_eq!(
            split_listen_url("127.0.0.1:5701"),
            ("127.0.0.1:5701".to_string(), "/".to_string())
        );
    }
}
