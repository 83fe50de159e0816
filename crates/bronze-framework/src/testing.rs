use std::any::Any;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bronze_core::{ApiCaller, ApiRequest, ApiResponse, ApiResult};
use parking_lot::Mutex;
use serde_json::json;

/// Records every request and answers with a fresh `message_id`.
pub(crate) struct MockCaller {
    self_id: i64,
    next_id: AtomicI64,
    pub requests: Mutex<Vec<ApiRequest>>,
}

impl MockCaller {
    pub fn new(self_id: i64) -> Self {
        Self {
            self_id,
            next_id: AtomicI64::new(100),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn actions(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.action.clone()).collect()
    }
}

#[async_trait]
impl ApiCaller for MockCaller {
    async fn call_api(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        self.requests.lock().push(request);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(ApiResponse::ok(json!({ "message_id": id })))
    }

    fn self_id(&self) -> i64 {
        self.self_id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
