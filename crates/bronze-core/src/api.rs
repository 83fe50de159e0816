//! Outbound call documents and the capability used to send them.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiResult;

/// An outbound call: `{action, params, echo}`.
///
/// `echo` is filled in by the correlator; requests built by users leave it
/// empty and it is omitted from the wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub action: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<u64>,
}

impl ApiRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Map::new(),
            echo: None,
        }
    }

    /// Adds one parameter, builder style.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// A call response: `{status, data, message|msg, wording, retcode, echo}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawResponse")]
pub struct ApiResponse {
    pub status: String,
    pub data: Value,
    pub message: String,
    pub wording: String,
    pub retcode: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo: Option<u64>,
}

/// Wire shape tolerant of the `msg` spelling, null fields and string echoes.
#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    wording: Option<String>,
    #[serde(default)]
    retcode: Option<i64>,
    #[serde(default)]
    echo: Value,
}

impl From<RawResponse> for ApiResponse {
    fn from(raw: RawResponse) -> Self {
        let echo = match &raw.echo {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        Self {
            status: raw.status.unwrap_or_default(),
            data: raw.data,
            message: raw
                .message
                .filter(|m| !m.is_empty())
                .or(raw.msg)
                .unwrap_or_default(),
            wording: raw.wording.unwrap_or_default(),
            retcode: raw.retcode.unwrap_or_default(),
            echo,
        }
    }
}

impl ApiResponse {
    /// A successful response carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            status: "ok".into(),
            data,
            ..Default::default()
        }
    }

    pub fn failed(retcode: i64, message: impl Into<String>) -> Self {
        Self {
            status: "failed".into(),
            retcode,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

/// A handle able to issue calls to one connected peer.
///
/// Transports implement this for their per-peer state. [`as_any`] exposes
/// the concrete type so code that knows which transport it runs on can
/// reach transport-specific functionality with [`downcast_caller`].
///
/// [`as_any`]: ApiCaller::as_any
#[async_trait]
pub trait ApiCaller: Send + Sync + 'static {
    /// Sends one call and waits for its response.
    async fn call_api(&self, request: ApiRequest) -> ApiResult<ApiResponse>;

    /// The peer's self id learned at handshake.
    fn self_id(&self) -> i64;

    fn as_any(&self) -> &dyn Any;
}

/// A shared caller handle.
pub type BoxedCaller = Arc<dyn ApiCaller>;

/// Recovers the concrete transport behind a caller.
pub fn downcast_caller<T: ApiCaller>(caller: &dyn ApiCaller) -> Option<&T> {
    caller.as_any().downcast_ref::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_omits_empty_echo() {
        let req = ApiRequest::new("send_msg").param("message", "hi");
        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire, json!({"action": "send_msg", "params": {"message": "hi"}}));
    }

    #[test]
    fn test_response_accepts_msg_and_string_echo() {
        let resp: ApiResponse = serde_json::from_value(json!({
            "status": "failed",
            "retcode": 100,
            "msg": "bad",
            "wording": "nope",
            "data": null,
            "echo": "7"
        }))
        .unwrap();
        assert!(resp.is_failed());
        assert_eq!(resp.message, "bad");
        assert_eq!(resp.echo, Some(7));
        assert_eq!(resp.retcode, 100);
    }

    #[test]
    fn test_empty_message_falls_back_to_msg() {
        let resp: ApiResponse = serde_json::from_value(json!({
            "status": "failed",
            "retcode": 1,
            "message": "",
            "msg": "token expired"
        }))
        .unwrap();
        assert_eq!(resp.message, "token expired");

        let resp: ApiResponse =
            serde_json::from_value(json!({"status": "ok", "message": "", "msg": null})).unwrap();
        assert_eq!(resp.message, "");
    }
}
