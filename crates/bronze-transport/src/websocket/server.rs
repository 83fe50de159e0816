//! Reverse WebSocket driver.
//!
//! Listens for OneBot implementations dialing in. Every accepted socket is
//! authenticated, hands over its self id in the first frame and then gets
//! its own caller, correlator and read loop. Closed sockets are forgotten;
//! the peer is expected to dial again.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use bronze_core::{
    ApiCaller, ApiRequest, ApiResponse, ApiResult, Correlator, Driver, DriverContext,
    TransportError, TransportResult,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::parse_handshake;
use crate::{RETRY_DELAY, split_listen_url};

/// Call handle for one accepted connection.
pub struct WsServerCaller {
    self_id: i64,
    remote: SocketAddr,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    correlator: Correlator,
}

impl WsServerCaller {
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

#[async_trait]
impl ApiCaller for WsServerCaller {
    async fn call_api(&self, mut request: ApiRequest) -> ApiResult<ApiResponse> {
        let pending = self.correlator.register(&mut request);
        let frame = serde_json::to_string(&request)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        debug!(bot_id = self.self_id, action = %request.action, "call sent");
        pending.wait().await
    }

    fn self_id(&self) -> i64 {
        self.self_id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Driver accepting reverse WebSocket connections.
pub struct WsServerDriver {
    addr: String,
    path: String,
    access_token: Option<String>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SyncMutex<Option<SocketAddr>>,
}

impl WsServerDriver {
    /// `url` names the listen address and route, e.g.
    /// `ws://0.0.0.0:6700/onebot`.
    pub fn new(url: &str, access_token: Option<String>) -> Self {
        let (addr, path) = split_listen_url(url);
        Self {
            addr,
            path,
            access_token: access_token.filter(|t| !t.is_empty()),
            listener: Mutex::new(None),
            local_addr: SyncMutex::new(None),
        }
    }

    /// The bound address, once `connect` has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    async fn bind(&self) -> TransportResult<()> {
        let listener =
            TcpListener::bind(&self.addr).await.map_err(|e| TransportError::BindFailed {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;
        *self.local_addr.lock() = listener.local_addr().ok();
        *self.listener.lock().await = Some(listener);
        Ok(())
    }
}

struct ServerState {
    ctx: DriverContext,
    access_token: Option<String>,
}

#[async_trait]
impl Driver for WsServerDriver {
    fn name(&self) -> &'static str {
        "ws-server"
    }

    async fn connect(&self, _ctx: &DriverContext) {
        match self.bind().await {
            Ok(()) => info!(addr = %self.addr, path = %self.path, "websocket server bound"),
            Err(e) => warn!(error = %e, "websocket server bind failed"),
        }
    }

    async fn listen(&self, ctx: DriverContext) {
        let state = Arc::new(ServerState {
            ctx: ctx.clone(),
            access_token: self.access_token.clone(),
        });
        loop {
            let listener = self.listener.lock().await.take();
            let Some(listener) = listener else {
                tokio::time::sleep(RETRY_DELAY).await;
                self.connect(&ctx).await;
                continue;
            };

            // `/` accepts upgrades on every path
            let router: Router<Arc<ServerState>> = if self.path == "/" {
                Router::new().fallback(upgrade)
            } else {
                Router::new().route(&self.path, any(upgrade))
            };
            let router: Router = router.with_state(state.clone());
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                error!(addr = %self.addr, error = %e, "websocket server stopped");
            }
        }
    }
}

/// Checks the access token of an incoming upgrade.
///
/// The token is read from `Authorization: <scheme> <token>`, falling back
/// to the `access_token` query parameter. A missing token is `401`, a wrong
/// one `403`.
pub(crate) fn check_auth(
    expected: Option<&str>,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<(), StatusCode> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split_once(' ').map_or(v, |(_, token)| token).trim())
        .filter(|token| !token.is_empty())
        .or(query_token.filter(|token| !token.is_empty()));
    match provided {
        None => Err(StatusCode::UNAUTHORIZED),
        Some(token) if token == expected => Ok(()),
        Some(_) => Err(StatusCode::FORBIDDEN),
    }
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let query_token = query.get("access_token").map(String::as_str);
    if let Err(status) = check_auth(state.access_token.as_deref(), &headers, query_token) {
        warn!(%remote, %status, "rejected websocket connection");
        return status.into_response();
    }
    ws.on_upgrade(move |socket| serve_peer(socket, remote, state))
}

async fn handshake(source: &mut SplitStream<WebSocket>) -> TransportResult<i64> {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => return parse_handshake(text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
        }
    }
    Err(TransportError::ConnectionClosed {
        reason: "closed before handshake".into(),
    })
}

async fn serve_peer(socket: WebSocket, remote: SocketAddr, state: Arc<ServerState>) {
    let (sink, mut source) = socket.split();
    let self_id = match handshake(&mut source).await {
        Ok(id) => id,
        Err(e) => {
            warn!(%remote, error = %e, "websocket handshake failed");
            return;
        }
    };

    let peer = Arc::new(WsServerCaller {
        self_id,
        remote,
        sink: Mutex::new(sink),
        correlator: Correlator::new(),
    });
    let caller: Arc<dyn ApiCaller> = peer.clone();
    info!(%remote, bot_id = self_id, "websocket client connected");
    state.ctx.directory().insert(self_id, caller.clone());

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let payload = text.as_str().as_bytes().to_vec();
                state.ctx.route_frame(payload, &peer.correlator, &caller);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(bot_id = self_id, error = %e, "websocket read failed");
                break;
            }
        }
    }

    state.ctx.directory().remove(self_id, &caller);
    let failed = peer.correlator.close_all();
    info!(%remote, bot_id = self_id, failed, "websocket client disconnected");
}
