//! Top-level orchestration.
//!
//! A [`BronzeRuntime`] owns the caller directory, the matcher registry and
//! the dispatcher, builds one driver per configured transport and runs
//! them.
//!
//! ```rust,ignore
//! use bronze_runtime::BronzeRuntime;
//! use bronze_framework::{handler, on_message, only_to_me};
//!
//! let runtime = BronzeRuntime::new()?;
//! runtime.register(on_message().rule(only_to_me()).handle(handler(|ctx| async move {
//!     let _ = ctx.send("pong").await;
//! })));
//! runtime.run_and_block().await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bronze_core::{BoxedDriver, CallerDirectory, DriverContext};
use bronze_framework::{Bot, Dispatcher, Matcher, MatcherRegistry};
use parking_lot::Mutex;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{BronzeConfig, ConfigLoader, DriverConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging::{self, LoggingGuard};

pub struct BronzeRuntime {
    config: BronzeConfig,
    directory: Arc<CallerDirectory>,
    dispatcher: Dispatcher,
    drivers: Vec<BoxedDriver>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    _logging: LoggingGuard,
}

impl BronzeRuntime {
    /// Loads configuration from the default locations and builds a runtime.
    pub fn new() -> RuntimeResult<Self> {
        Self::builder().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Validates `config`, installs logging and builds the drivers.
    pub fn from_config(config: BronzeConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        let guard = logging::init_from_config(&config.logging);
        let drivers = config
            .drivers
            .iter()
            .map(build_driver)
            .collect::<RuntimeResult<Vec<_>>>()?;

        let registry = Arc::new(MatcherRegistry::new());
        let dispatcher = Dispatcher::new(registry, config.bot.clone());
        info!(
            drivers = drivers.len(),
            ring_len = config.bot.ring_len,
            log_level = %config.logging.level,
            "runtime initialized"
        );

        Ok(Self {
            config,
            directory: Arc::new(CallerDirectory::new()),
            dispatcher,
            drivers,
            listeners: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            _logging: guard,
        })
    }

    /// Adds a driver not described by configuration.
    pub fn with_driver(mut self, driver: BoxedDriver) -> Self {
        self.drivers.push(driver);
        self
    }

    pub fn config(&self) -> &BronzeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MatcherRegistry> {
        self.dispatcher.registry()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn directory(&self) -> &Arc<CallerDirectory> {
        &self.directory
    }

    /// Registers a matcher; see [`MatcherRegistry::register`].
    pub fn register(&self, matcher: Matcher) -> Matcher {
        self.registry().register(matcher)
    }

    /// The connected bot with this self id.
    pub fn get_bot(&self, self_id: i64) -> Option<Bot> {
        self.directory.get(self_id).map(Bot::new)
    }

    /// Visits connected bots until `f` returns false.
    pub fn range_bots<F>(&self, mut f: F)
    where
        F: FnMut(i64, Bot) -> bool,
    {
        self.directory
            .range(|self_id, caller| f(self_id, Bot::new(caller.clone())));
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Connects every driver in order, then spawns its listen loop.
    ///
    /// Dialing drivers retry until they connect, so this returns once all
    /// of them are up. A second call does nothing.
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("runtime is already running");
            return;
        }
        self.dispatcher.start();
        let ctx = DriverContext::new(self.directory.clone(), self.dispatcher.sink());
        for driver in &self.drivers {
            info!(driver = driver.name(), "connecting driver");
            driver.connect(&ctx).await;
            let driver = driver.clone();
            let ctx = ctx.clone();
            let handle = tokio::spawn(async move { driver.listen(ctx).await });
            self.listeners.lock().push(handle);
        }
        info!("bronze runtime is running");
    }

    /// Runs until Ctrl-C or SIGTERM, then stops.
    pub async fn run_and_block(&self) {
        self.run().await;
        wait_for_shutdown().await;
        self.stop();
    }

    /// Aborts the listen loops and stops the ingestion buffer.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        for handle in self.listeners.lock().drain(..) {
            handle.abort();
        }
        self.dispatcher.shutdown();
        info!("bronze runtime stopped");
    }
}

fn build_driver(config: &DriverConfig) -> RuntimeResult<BoxedDriver> {
    match config {
        #[cfg(feature = "ws-client")]
        DriverConfig::WsClient(ws) => Ok(Arc::new(bronze_transport::WsClientDriver::new(
            ws.url.clone(),
            ws.access_token.clone(),
        ))),
        #[cfg(feature = "ws-server")]
        DriverConfig::WsServer(ws) => Ok(Arc::new(bronze_transport::WsServerDriver::new(
            &ws.url,
            ws.access_token.clone(),
        ))),
        #[cfg(all(feature = "http-client", feature = "http-server"))]
        DriverConfig::Http(http) => Ok(Arc::new(bronze_transport::HttpDriver::new(
            &http.listen,
            http.api_url.clone(),
            http.access_token.clone(),
            http.secret.clone(),
        )?)),
        #[allow(unreachable_patterns)]
        other => Err(RuntimeError::DriverUnavailable(other.kind())),
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("received Ctrl-C, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "cannot listen for SIGTERM"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C, shutting down"),
        Err(e) => error!(error = %e, "cannot listen for Ctrl-C, shutting down"),
    }
}

/// Builds a [`BronzeRuntime`] from a customized [`ConfigLoader`].
pub struct RuntimeBuilder {
    loader: ConfigLoader,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    pub fn merge(mut self, config: BronzeConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    pub fn build(self) -> RuntimeResult<BronzeRuntime> {
        BronzeRuntime::from_config(self.loader.load()?)
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use async_trait::async_trait;
    use bronze_core::{ApiCaller, ApiRequest, ApiResponse, ApiResult, Driver};
    use bronze_framework::{handler, on_message};
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::WsClientConfig;

    struct EchoCaller(i64);

    #[async_trait]
    impl ApiCaller for EchoCaller {
        async fn call_api(&self, _request: ApiRequest) -> ApiResult<ApiResponse> {
            Ok(ApiResponse::ok(json!({"message_id": 1})))
        }

        fn self_id(&self) -> i64 {
            self.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Registers one bot on connect and delivers a single private message.
    struct OneShotDriver;

    #[async_trait]
    impl Driver for OneShotDriver {
        fn name(&self) -> &'static str {
            "one-shot"
        }

        async fn connect(&self, ctx: &DriverContext) {
            ctx.directory().insert(99, Arc::new(EchoCaller(99)));
        }

        async fn listen(&self, ctx: DriverContext) {
            let payload = json!({
                "post_type": "message",
                "message_type": "private",
                "self_id": 99,
                "user_id": 5,
                "message_id": 7,
                "message": "ping",
            });
            let caller = ctx.directory().get(99);
            if let Some(caller) = caller {
                ctx.dispatch(payload.to_string().into_bytes(), caller);
            }
        }
    }

    #[tokio::test]
    async fn test_bots_from_directory() {
        let runtime = BronzeRuntime::from_config(BronzeConfig::default()).unwrap();
        assert!(runtime.get_bot(1).is_none());

        runtime.directory().insert(1, Arc::new(EchoCaller(1)));
        runtime.directory().insert(2, Arc::new(EchoCaller(2)));
        assert_eq!(runtime.get_bot(2).map(|bot| bot.self_id()), Some(2));

        let mut seen = Vec::new();
        runtime.range_bots(|id, bot| {
            assert_eq!(id, bot.self_id());
            seen.push(id);
            false
        });
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn test_run_delivers_events() {
        let runtime = BronzeRuntime::from_config(BronzeConfig::default())
            .unwrap()
            .with_driver(Arc::new(OneShotDriver));

        let (tx, mut rx) = mpsc::unbounded_channel();
        runtime.register(on_message().handle(handler(move |ctx| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(ctx.message_string().to_string());
            }
        })));

        runtime.run().await;
        assert!(runtime.is_running());
        assert!(runtime.get_bot(99).is_some());
        assert_eq!(rx.recv().await.as_deref(), Some("ping"));

        runtime.run().await;
        runtime.stop();
        assert!(!runtime.is_running());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = BronzeConfig::default();
        config.bot.max_process_time_ms = 0;
        assert!(matches!(
            BronzeRuntime::from_config(config),
            Err(RuntimeError::Config(_))
        ));
    }

    #[cfg(not(feature = "ws-client"))]
    #[test]
    fn test_compiled_out_driver() {
        let config = BronzeConfig {
            drivers: vec![DriverConfig::WsClient(WsClientConfig {
                url: "ws://127.0.0.1:6700".into(),
                access_token: None,
            })],
            ..Default::default()
        };
        assert!(matches!(
            BronzeRuntime::from_config(config),
            Err(RuntimeError::DriverUnavailable("ws-client"))
        ));
    }

    #[cfg(feature = "ws-client")]
    #[test]
    fn test_builds_configured_driver() {
        let config = BronzeConfig {
            drivers: vec![DriverConfig::WsClient(WsClientConfig {
                url: "ws://127.0.0.1:6700".into(),
                access_token: None,
            })],
            ..Default::default()
        };
        let runtime = BronzeRuntime::from_config(config).unwrap();
        assert_eq!(runtime.drivers[0].name(), "ws-client");
    }
}
