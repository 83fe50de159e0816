//! Outbound half of the HTTP transport: one POST per call.

use std::any::Any;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bronze_core::{
    ApiCaller, ApiError, ApiRequest, ApiResponse, ApiResult, CALL_TIMEOUT, TransportError,
    TransportResult,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, info};

use crate::USER_AGENT;

/// Calls a OneBot HTTP API at `{api_url}/{action}`.
pub struct HttpCaller {
    api_url: String,
    access_token: Option<String>,
    self_id: AtomicI64,
    client: reqwest::Client,
}

impl HttpCaller {
    pub fn new(api_url: impl Into<String>, access_token: Option<String>) -> TransportResult<Self> {
        let api_url = api_url.into();
        let mut headers = HeaderMap::new();
        headers.insert("X-Client-Role", HeaderValue::from_static("Universal"));
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::InvalidUrl {
                url: api_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token: access_token.filter(|t| !t.is_empty()),
            self_id: AtomicI64::new(0),
            client,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Learns the self id with a single `get_login_info` call.
    pub async fn handshake(&self) -> ApiResult<i64> {
        let response = self.call_api(ApiRequest::new("get_login_info")).await?;
        if response.is_failed() {
            return Err(ApiError::Failed {
                response: Box::new(response),
            });
        }
        let self_id = match &response.data["user_id"] {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| ApiError::InvalidResponse("login info carries no user_id".into()))?;
        self.self_id.store(self_id, Ordering::Release);
        info!(api_url = %self.api_url, bot_id = self_id, "http api reachable");
        Ok(self_id)
    }

    async fn post(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let url = format!("{}/{}", self.api_url, request.action);
        let mut builder = self.client.post(&url).json(&request.params);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Failed {
                response: Box::new(status_failure(status.as_u16(), status.to_string())),
            });
        }
        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

/// Synthetic response for a non-success HTTP status.
pub(crate) fn status_failure(status: u16, reason: impl Into<String>) -> ApiResponse {
    ApiResponse::failed(1000 + i64::from(status), reason)
}

#[async_trait]
impl ApiCaller for HttpCaller {
    async fn call_api(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        debug!(bot_id = self.self_id(), action = %request.action, "http call");
        tokio::time::timeout(CALL_TIMEOUT, self.post(&request))
            .await
            .map_err(|_| ApiError::DeadlineExceeded)?
    }

    fn self_id(&self) -> i64 {
        self.self_id.load(Ordering::Acquire)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_failure() {
        let response = status_failure(503, "503 Service Unavailable");
        assert!(response.is_failed());
        assert_eq!(response.retcode, 1503);
        assert_eq!(response.message, "503 Service Unavailable");
    }

    #[test]
    fn test_trims_api_url() {
        let caller = HttpCaller::new("http://127.0.0.1:5700/", None).unwrap();
        assert_eq!(caller.api_url(), "http://127.0.0.1:5700");
        assert_eq!(caller.self_id(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_api() {
        let caller = HttpCaller::new("http://127.0.0.1:1", None).unwrap();
        let err = caller.call_api(ApiRequest::new("get_status")).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(TransportError::SendFailed(_))));
    }
}
