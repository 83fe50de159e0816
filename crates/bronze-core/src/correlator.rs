//! Request/response matching by echo token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::api::{ApiRequest, ApiResponse};
use crate::error::{ApiError, ApiResult};

/// How long a call waits for its response.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Matches responses to pending calls on one connection.
///
/// Every call gets the next echo token and parks a oneshot slot under it.
/// The receive loop hands responses to [`resolve`](Correlator::resolve);
/// responses whose token is not pending are dropped.
pub struct Correlator {
    next_echo: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<ApiResponse>>,
    timeout: Duration,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::with_timeout(CALL_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            next_echo: AtomicU64::new(0),
            pending: DashMap::new(),
            timeout,
        }
    }

    /// Stamps `request` with a fresh echo token and registers a slot for it.
    pub fn register(&self, request: &mut ApiRequest) -> PendingCall<'_> {
        let echo = self.next_echo.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(echo, tx);
        request.echo = Some(echo);
        trace!(echo, action = %request.action, "registered pending call");
        PendingCall {
            echo,
            rx,
            correlator: self,
        }
    }

    /// Delivers a response to its waiting caller.
    ///
    /// Returns false when no call is pending under the response's echo.
    pub fn resolve(&self, response: ApiResponse) -> bool {
        let Some(echo) = response.echo else {
            return false;
        };
        match self.pending.remove(&echo) {
            Some((_, tx)) => {
                // The waiter may have given up in the meantime.
                let _ = tx.send(response);
                true
            }
            None => {
                debug!(echo, "dropping response for unknown echo");
                false
            }
        }
    }

    /// Fails every pending call with [`ApiError::ClosedPipe`].
    pub fn close_all(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        if count > 0 {
            debug!(count, "abandoned pending calls on closed connection");
        }
        count
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// A registered call awaiting its response.
///
/// Dropping it without waiting releases the slot, so a write failure or a
/// cancelled caller never leaves a stale entry behind.
pub struct PendingCall<'a> {
    echo: u64,
    rx: oneshot::Receiver<ApiResponse>,
    correlator: &'a Correlator,
}

impl PendingCall<'_> {
    pub fn echo(&self) -> u64 {
        self.echo
    }

    /// Waits for the response, the call deadline, or the connection closing.
    pub async fn wait(mut self) -> ApiResult<ApiResponse> {
        match tokio::time::timeout(self.correlator.timeout, &mut self.rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ApiError::ClosedPipe),
            Err(_) => {
                debug!(echo = self.echo, "call deadline exceeded");
                Err(ApiError::DeadlineExceeded)
            }
        }
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.correlator.pending.remove(&self.echo);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(echo: u64, data: i64) -> ApiResponse {
        ApiResponse {
            echo: Some(echo),
            ..ApiResponse::ok(json!(data))
        }
    }

    #[test]
    fn test_tokens_increase() {
        let correlator = Correlator::new();
        let mut a = ApiRequest::new("a");
        let mut b = ApiRequest::new("b");
        let first = correlator.register(&mut a);
        let second = correlator.register(&mut b);
        assert!(second.echo() > first.echo());
        assert_eq!(a.echo, Some(first.echo()));
        assert_eq!(correlator.pending_len(), 2);
        drop(first);
        assert_eq!(correlator.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_resolution() {
        let correlator = Correlator::new();
        let mut a = ApiRequest::new("a");
        let mut b = ApiRequest::new("b");
        let call_a = correlator.register(&mut a);
        let call_b = correlator.register(&mut b);
        let (echo_a, echo_b) = (call_a.echo(), call_b.echo());

        let (ra, rb, _) = tokio::join!(call_a.wait(), call_b.wait(), async {
            assert!(correlator.resolve(response(echo_b, 2)));
            assert!(correlator.resolve(response(echo_a, 1)));
        });

        assert_eq!(ra.unwrap().data, json!(1));
        assert_eq!(rb.unwrap().data, json!(2));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_is_dropped() {
        let correlator = Correlator::with_timeout(Duration::from_secs(1));
        let mut req = ApiRequest::new("slow");
        let call = correlator.register(&mut req);
        let echo = call.echo();

        let result = call.wait().await;
        assert!(matches!(result, Err(ApiError::DeadlineExceeded)));
        assert_eq!(correlator.pending_len(), 0);
        assert!(!correlator.resolve(response(echo, 0)));
    }

    #[tokio::test]
    async fn test_close_fails_pending_calls() {
        let correlator = Correlator::new();
        let mut req = ApiRequest::new("x");
        let call = correlator.register(&mut req);

        let (result, closed) = tokio::join!(call.wait(), async { correlator.close_all() });
        assert_eq!(closed, 1);
        tokio_test::assert_err!(&result);
        assert!(matches!(result, Err(ApiError::ClosedPipe)));
    }
}
