//! Forward WebSocket driver.
//!
//! Dials the OneBot implementation, reads the handshake frame for the
//! self id, then multiplexes calls and events over the one socket. A
//! dropped connection fails every pending call and is re-dialed.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bronze_core::{
    ApiCaller, ApiError, ApiRequest, ApiResponse, ApiResult, Correlator, Driver, DriverContext,
    TransportError, TransportResult,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::{RECONNECT_DELAY, parse_handshake};
use crate::{RETRY_DELAY, USER_AGENT};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Call handle for the forward WebSocket connection.
///
/// The same caller survives reconnects; while disconnected its calls fail
/// with [`ApiError::NotConnected`].
pub struct WsClientCaller {
    url: String,
    self_id: AtomicI64,
    sink: Mutex<Option<WsSink>>,
    correlator: Correlator,
}

impl WsClientCaller {
    fn new(url: String) -> Self {
        Self {
            url,
            self_id: AtomicI64::new(0),
            sink: Mutex::new(None),
            correlator: Correlator::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a socket is currently attached.
    pub async fn is_connected(&self) -> bool {
        self.sink.lock().await.is_some()
    }
}

#[async_trait]
impl ApiCaller for WsClientCaller {
    async fn call_api(&self, mut request: ApiRequest) -> ApiResult<ApiResponse> {
        // Registered under the sink lock so a reconnect cannot fail a call
        // that was written to the new socket.
        let pending = {
            let mut guard = self.sink.lock().await;
            let sink = guard.as_mut().ok_or(ApiError::NotConnected)?;
            let pending = self.correlator.register(&mut request);
            let frame = serde_json::to_string(&request)?;
            sink.send(Message::Text(frame.into()))
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            pending
        };
        debug!(
            bot_id = self.self_id(),
            action = %request.action,
            echo = pending.echo(),
            "call sent"
        );
        pending.wait().await
    }

    fn self_id(&self) -> i64 {
        self.self_id.load(Ordering::Acquire)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Driver dialing a OneBot forward WebSocket endpoint.
pub struct WsClientDriver {
    access_token: Option<String>,
    caller: Arc<WsClientCaller>,
    source: Mutex<Option<WsSource>>,
}

impl WsClientDriver {
    pub fn new(url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            access_token: access_token.filter(|t| !t.is_empty()),
            caller: Arc::new(WsClientCaller::new(url.into())),
            source: Mutex::new(None),
        }
    }

    pub fn caller(&self) -> &Arc<WsClientCaller> {
        &self.caller
    }

    async fn dial(&self) -> TransportResult<(WsSink, WsSource, i64)> {
        let url = self.caller.url();
        let failed = |reason: String| TransportError::ConnectionFailed {
            url: url.to_string(),
            reason,
        };

        let mut request = url.into_client_request().map_err(|e| failed(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert("X-Client-Role", HeaderValue::from_static("Universal"));
        headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));
        if let Some(token) = &self.access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| failed(e.to_string()))?;
            headers.insert("Authorization", value);
        }

        let (stream, _) = connect_async(request).await.map_err(|e| failed(e.to_string()))?;
        let (sink, mut source) = stream.split();

        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => {
                    let self_id = parse_handshake(text.as_str())?;
                    return Ok((sink, source, self_id));
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(TransportError::ConnectionClosed {
                        reason: "closed before handshake".into(),
                    });
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl Driver for WsClientDriver {
    fn name(&self) -> &'static str {
        "ws-client"
    }

    async fn connect(&self, ctx: &DriverContext) {
        let url = self.caller.url();
        loop {
            match self.dial().await {
                Ok((sink, source, self_id)) => {
                    self.caller.self_id.store(self_id, Ordering::Release);
                    *self.caller.sink.lock().await = Some(sink);
                    *self.source.lock().await = Some(source);
                    info!(url, bot_id = self_id, "connected to websocket server");
                    ctx.directory().insert(self_id, self.caller.clone());
                    return;
                }
                Err(e) => {
                    warn!(url, error = %e, "websocket dial failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    async fn listen(&self, ctx: DriverContext) {
        let caller: Arc<dyn ApiCaller> = self.caller.clone();
        loop {
            let source = self.source.lock().await.take();
            let Some(mut source) = source else {
                self.connect(&ctx).await;
                continue;
            };

            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        let payload = text.as_str().as_bytes().to_vec();
                        ctx.route_frame(payload, &self.caller.correlator, &caller);
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(bot_id = caller.self_id(), error = %e, "websocket read failed");
                        break;
                    }
                }
            }

            let self_id = caller.self_id();
            ctx.directory().remove(self_id, &caller);
            let failed = {
                let mut sink = self.caller.sink.lock().await;
                *sink = None;
                self.caller.correlator.close_all()
            };
            warn!(bot_id = self_id, failed, "websocket connection lost, reconnecting");
            tokio::time::sleep(RECONNECT_DELAY).await;
            self.connect(&ctx).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bronze_core::CallerDirectory;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::{accept_async, accept_hdr_async};
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    use super::*;

    #[tokio::test]
    async fn test_connect_call_and_event() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (role_tx, role_rx) = oneshot::channel::<Option<String>>();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request,
                                 resp: Response|
                  -> Result<Response, ErrorResponse> {
                let role = req
                    .headers()
                    .get("X-Client-Role")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let _ = role_tx.send(role);
                Ok(resp)
            };
            let mut ws = accept_hdr_async(tcp, callback).await.unwrap();
            ws.send(Message::Text(r#"{"self_id":7}"#.into())).await.unwrap();

            let request = loop {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    break serde_json::from_str::<serde_json::Value>(text.as_str()).unwrap();
                }
            };
            assert_eq!(request["action"], "get_status");
            let event = r#"{"post_type":"notice","notice_type":"group_increase","self_id":7}"#;
            ws.send(Message::Text(event.into())).await.unwrap();
            let response = format!(
                r#"{{"status":"ok","retcode":0,"data":{{"good":true}},"echo":{}}}"#,
                request["echo"]
            );
            ws.send(Message::Text(response.into())).await.unwrap();
            // keep the socket open until the test finishes
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
        let directory = Arc::new(CallerDirectory::new());
        let ctx = DriverContext::new(
            directory.clone(),
            Arc::new(move |payload: Vec<u8>, _: Arc<dyn ApiCaller>| {
                let _ = event_tx.send(payload);
            }),
        );

        let driver = Arc::new(WsClientDriver::new(format!("ws://{addr}"), None));
        driver.connect(&ctx).await;
        assert_eq!(role_rx.await.unwrap().as_deref(), Some("Universal"));
        assert!(directory.contains(7));
        assert_eq!(driver.caller().self_id(), 7);

        let listening = driver.clone();
        tokio::spawn(async move { listening.listen(ctx).await });

        let response = driver.caller().call_api(ApiRequest::new("get_status")).await.unwrap();
        assert_eq!(response.data["good"], true);

        let event = event_rx.recv().await.unwrap();
        assert!(String::from_utf8(event).unwrap().contains("group_increase"));
        server.abort();
    }

    #[tokio::test]
    async fn test_lost_connection_fails_calls_and_redials() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"self_id":7}"#.into())).await.unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if frame.is_text() {
                    break;
                }
            }
            // drop the socket without answering the call
            drop(ws);

            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"self_id":7}"#.into())).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let directory = Arc::new(CallerDirectory::new());
        let ctx = DriverContext::new(
            directory.clone(),
            Arc::new(|_: Vec<u8>, _: Arc<dyn ApiCaller>| {}),
        );
        let driver = Arc::new(WsClientDriver::new(format!("ws://{addr}"), None));
        driver.connect(&ctx).await;
        assert!(directory.contains(7));

        let listening = driver.clone();
        tokio::spawn(async move { listening.listen(ctx).await });

        let err = driver.caller().call_api(ApiRequest::new("get_status")).await.unwrap_err();
        assert!(matches!(err, ApiError::ClosedPipe), "unexpected error: {err}");

        tokio::time::timeout(Duration::from_secs(5), async {
            while !(driver.caller().is_connected().await && directory.contains(7)) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(driver.caller().correlator.pending_len(), 0);
        server.abort();
    }

    #[tokio::test]
    async fn test_call_without_connection() {
        let driver = WsClientDriver::new("ws://127.0.0.1:1", None);
        let err = driver.caller().call_api(ApiRequest::new("get_status")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotConnected));
        assert_eq!(driver.caller().correlator.pending_len(), 0);
    }
}
