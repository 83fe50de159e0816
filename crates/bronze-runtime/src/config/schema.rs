//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bronze_core::BotConfig;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
///
/// ```toml
/// [bot]
/// nickname = ["bronze"]
/// super_users = [10001]
///
/// [[drivers]]
/// type = "ws-client"
/// url = "ws://127.0.0.1:6700"
///
/// [logging]
/// level = "debug"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BronzeConfig {
    /// Dispatch and normalization settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// Transports to start, in order.
    #[serde(default)]
    pub drivers: Vec<DriverConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One transport, selected by its `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DriverConfig {
    /// Dial a forward WebSocket endpoint.
    WsClient(WsClientConfig),

    /// Accept reverse WebSocket connections.
    WsServer(WsServerConfig),

    /// Call the HTTP API and receive event POSTs.
    Http(HttpConfig),
}

impl DriverConfig {
    /// The `type` tag, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WsClient(_) => "ws-client",
            Self::WsServer(_) => "ws-server",
            Self::Http(_) => "http",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsClientConfig {
    /// Endpoint to dial, `ws://` or `wss://`.
    pub url: String,

    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsServerConfig {
    /// Listen address and route, e.g. `ws://0.0.0.0:6700/onebot`.
    pub url: String,

    /// Required from connecting peers when set.
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Local address receiving event POSTs.
    pub listen: String,

    /// Root of the platform's HTTP API.
    pub api_url: String,

    #[serde(default)]
    pub access_token: Option<String>,

    /// HMAC-SHA1 key inbound events must be signed with.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Needs the `json-log` feature; otherwise rendered as `full`.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Requires `file_path`.
    File,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level: trace, debug, info, warn or error.
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    pub file_path: Option<PathBuf>,
    /// Per-target overrides, e.g. `bronze_transport = "trace"`.
    pub filters: BTreeMap<String, String>,
    pub thread_ids: bool,
    /// Show source file and line.
    pub file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            filters: BTreeMap::new(),
            thread_ids: false,
            file_location: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_tags() {
        let drivers: Vec<DriverConfig> = serde_json::from_str(
            r#"[
                {"type": "ws-client", "url": "ws://127.0.0.1:6700"},
                {"type": "ws-server", "url": "ws://0.0.0.0:6701", "access_token": "t"},
                {"type": "http", "listen": "127.0.0.1:5701", "api_url": "http://127.0.0.1:5700"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            drivers.iter().map(DriverConfig::kind).collect::<Vec<_>>(),
            ["ws-client", "ws-server", "http"]
        );
        match &drivers[2] {
            DriverConfig::Http(http) => assert!(http.secret.is_none()),
            other => panic!("unexpected driver: {other:?}"),
        }
    }

    #[test]
    fn test_partial_logging_section() {
        let logging: LoggingConfig =
            serde_json::from_str(r#"{"format": "pretty", "filters": {"bronze_core": "trace"}}"#)
                .unwrap();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, LogFormat::Pretty);
        assert_eq!(logging.filters["bronze_core"], "trace");
    }
}
