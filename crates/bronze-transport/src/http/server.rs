//! Inbound half of the HTTP transport: the platform POSTs events here.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, header};
use bronze_core::{ApiCaller, DriverContext, Frame};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::{debug, trace, warn};

type HmacSha1 = Hmac<Sha1>;

/// Header carrying `sha1=<hex hmac of the body>`.
pub const SIGNATURE_HEADER: &str = "X-Signature";

pub(crate) struct InboundState {
    pub(crate) ctx: DriverContext,
    pub(crate) secret: Option<String>,
    pub(crate) caller: Arc<dyn ApiCaller>,
}

/// Every path accepts event POSTs.
pub(crate) fn router(state: Arc<InboundState>) -> Router {
    Router::new().fallback(receive).with_state(state)
}

/// Signs `body` the way the platform does.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha1::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a `sha1=<hex>` signature in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(digest) = signature.strip_prefix("sha1=") else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

async fn receive(
    State(state): State<Arc<InboundState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if method != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED;
    }
    let json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !json {
        return StatusCode::NOT_ACCEPTABLE;
    }
    if let Some(secret) = &state.secret {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        match signature {
            None => return StatusCode::UNAUTHORIZED,
            Some(sig) if !verify_signature(secret, &body, sig) => {
                warn!(bot_id = state.caller.self_id(), "event signature mismatch");
                return StatusCode::FORBIDDEN;
            }
            Some(_) => {}
        }
    }

    match Frame::classify(&body) {
        Ok(Frame::Event) => state.ctx.dispatch(body.to_vec(), state.caller.clone()),
        Ok(Frame::Heartbeat) => trace!(bot_id = state.caller.self_id(), "heartbeat"),
        Ok(Frame::Response(_)) => debug!("ignoring call response posted to the event endpoint"),
        Err(e) => {
            warn!(error = %e, "malformed event body");
            return StatusCode::BAD_REQUEST;
        }
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature() {
        let body = br#"{"post_type":"message"}"#;
        let signature = sign("s3cret", body);
        assert!(signature.starts_with("sha1="));
        assert_eq!(signature.len(), 5 + 40);
        assert!(verify_signature("s3cret", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("s3cret", b"{}", &signature));
        assert!(!verify_signature("s3cret", body, "md5=abcd"));
        assert!(!verify_signature("s3cret", body, "sha1=zz"));
    }
}
