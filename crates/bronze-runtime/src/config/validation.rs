//! Configuration validation.

use std::str::FromStr;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BronzeConfig, DriverConfig, LogOutput, LoggingConfig};

/// Checks a loaded configuration before a runtime is built from it.
pub fn validate_config(config: &BronzeConfig) -> ConfigResult<()> {
    if config.bot.max_process_time_ms == 0 {
        return Err(ConfigError::validation(
            "bot.max_process_time_ms must be greater than 0",
        ));
    }
    validate_logging(&config.logging)?;
    for (i, driver) in config.drivers.iter().enumerate() {
        validate_driver(i, driver)?;
    }
    Ok(())
}

fn validate_level(key: &str, level: &str) -> ConfigResult<()> {
    tracing::Level::from_str(level).map(|_| ()).map_err(|_| {
        ConfigError::validation(format!(
            "{key}: invalid log level '{level}', expected one of trace, debug, info, warn, error"
        ))
    })
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    validate_level("logging.level", &logging.level)?;
    for (target, level) in &logging.filters {
        validate_level(&format!("logging.filters.{target}"), level)?;
    }
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_driver(index: usize, driver: &DriverConfig) -> ConfigResult<()> {
    let field = |name: &str| format!("drivers[{index}].{name}");
    match driver {
        DriverConfig::WsClient(ws) => validate_url(&field("url"), &ws.url, &["ws", "wss"], true),
        DriverConfig::WsServer(ws) => validate_url(&field("url"), &ws.url, &["ws", "wss"], false),
        DriverConfig::Http(http) => {
            validate_url(&field("listen"), &http.listen, &["http", "https"], false)?;
            validate_url(&field("api_url"), &http.api_url, &["http", "https"], true)
        }
    }
}

/// Dialed URLs need an explicit scheme; listen addresses may omit it.
fn validate_url(field: &str, url: &str, schemes: &[&str], dialed: bool) -> ConfigResult<()> {
    if url.trim().is_empty() {
        return Err(ConfigError::missing_field(field));
    }
    match url.split_once("://") {
        Some((scheme, rest)) => {
            if !schemes.contains(&scheme) {
                return Err(ConfigError::invalid_url(
                    url,
                    format!("scheme must be one of {schemes:?}"),
                ));
            }
            if rest.is_empty() {
                return Err(ConfigError::invalid_url(url, "missing host"));
            }
            Ok(())
        }
        None if dialed => Err(ConfigError::invalid_url(
            url,
            format!("scheme must be one of {schemes:?}"),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpConfig, WsClientConfig, WsServerConfig};

    fn with_driver(driver: DriverConfig) -> BronzeConfig {
        BronzeConfig {
            drivers: vec![driver],
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&BronzeConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_process_time() {
        let mut config = BronzeConfig::default();
        config.bot.max_process_time_ms = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_log_levels() {
        let mut config = BronzeConfig::default();
        config.logging.level = "loud".into();
        assert!(validate_config(&config).is_err());

        config.logging.level = "DEBUG".into();
        config.logging.filters.insert("bronze_core".into(), "trace".into());
        assert!(validate_config(&config).is_ok());

        config.logging.filters.insert("bronze_transport".into(), "chatty".into());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = BronzeConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "logging.file_path"
        ));
    }

    #[test]
    fn test_validate_driver_urls() {
        let ws_client = |url: &str| {
            with_driver(DriverConfig::WsClient(WsClientConfig {
                url: url.into(),
                access_token: None,
            }))
        };
        assert!(validate_config(&ws_client("ws://127.0.0.1:6700")).is_ok());
        assert!(matches!(
            validate_config(&ws_client("")),
            Err(ConfigError::MissingField { .. })
        ));
        assert!(matches!(
            validate_config(&ws_client("http://127.0.0.1:6700")),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(validate_config(&ws_client("127.0.0.1:6700")).is_err());

        let ws_server = with_driver(DriverConfig::WsServer(WsServerConfig {
            url: "0.0.0.0:6700/onebot".into(),
            access_token: None,
        }));
        assert!(validate_config(&ws_server).is_ok());

        let http = with_driver(DriverConfig::Http(HttpConfig {
            listen: "127.0.0.1:5701".into(),
            api_url: "ws://127.0.0.1:5700".into(),
            access_token: None,
            secret: None,
        }));
        assert!(matches!(
            validate_config(&http),
            Err(ConfigError::InvalidUrl { url, .. }) if url == "ws://127.0.0.1:5700"
        ));
    }
}
