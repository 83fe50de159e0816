//! HTTP transport.
//!
//! Calls go out as `POST {api_url}/{action}` with the params as the JSON
//! body; events come in as POSTs to a local listener. [`HttpDriver`] pairs
//! the two halves and needs both `http-client` and `http-server`.

#[cfg(feature = "http-client")]
mod client;
#[cfg(feature = "http-client")]
pub use client::HttpCaller;

#[cfg(feature = "http-server")]
mod server;
#[cfg(feature = "http-server")]
pub use server::{SIGNATURE_HEADER, sign, verify_signature};

#[cfg(all(feature = "http-client", feature = "http-server"))]
pub use driver::HttpDriver;

#[cfg(all(feature = "http-client", feature = "http-server"))]
mod driver {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use async_trait::async_trait;
    use bronze_core::{ApiCaller, Driver, DriverContext, TransportResult};
    use parking_lot::Mutex;
    use tokio::net::TcpListener;
    use tracing::{error, info, warn};

    use super::HttpCaller;
    use super::server::{InboundState, router};
    use crate::{RETRY_DELAY, split_listen_url};

    /// Driver for OneBot's HTTP API plus HTTP event POSTs.
    pub struct HttpDriver {
        addr: String,
        secret: Option<String>,
        caller: Arc<HttpCaller>,
        local_addr: Mutex<Option<SocketAddr>>,
    }

    impl HttpDriver {
        /// `listen` is the local event endpoint, `api_url` the platform's
        /// API root. With a `secret`, inbound events must be signed.
        pub fn new(
            listen: &str,
            api_url: impl Into<String>,
            access_token: Option<String>,
            secret: Option<String>,
        ) -> TransportResult<Self> {
            let (addr, _) = split_listen_url(listen);
            Ok(Self {
                addr,
                secret: secret.filter(|s| !s.is_empty()),
                caller: Arc::new(HttpCaller::new(api_url, access_token)?),
                local_addr: Mutex::new(None),
            })
        }

        pub fn caller(&self) -> &Arc<HttpCaller> {
            &self.caller
        }

        /// The bound event listener address, once `listen` is serving.
        pub fn local_addr(&self) -> Option<SocketAddr> {
            *self.local_addr.lock()
        }
    }

    #[async_trait]
    impl Driver for HttpDriver {
        fn name(&self) -> &'static str {
            "http"
        }

        async fn connect(&self, ctx: &DriverContext) {
            match self.caller.handshake().await {
                Ok(self_id) => ctx.directory().insert(self_id, self.caller.clone()),
                Err(e) => warn!(
                    api_url = %self.caller.api_url(),
                    error = %e,
                    "get_login_info failed, bot stays unregistered"
                ),
            }
        }

        async fn listen(&self, ctx: DriverContext) {
            let caller: Arc<dyn ApiCaller> = self.caller.clone();
            let state = Arc::new(InboundState {
                ctx,
                secret: self.secret.clone(),
                caller,
            });
            loop {
                let listener = match TcpListener::bind(&self.addr).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        warn!(addr = %self.addr, error = %e, "http listener bind failed");
                        tokio::time::sleep(RETRY_DELAY).await;
                        continue;
                    }
                };
                *self.local_addr.lock() = listener.local_addr().ok();
                info!(addr = %self.addr, "http event listener bound");
                if let Err(e) = axum::serve(listener, router(state.clone())).await {
                    error!(addr = %self.addr, error = %e, "http event listener stopped");
                }
            }
        }
    }

}
