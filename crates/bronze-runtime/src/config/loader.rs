//! Layered configuration loading with figment.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults ([`BronzeConfig::default`])
//! 2. Programmatic values passed to [`ConfigLoader::merge`]
//! 3. A profile file (`bronze.{profile}.toml`), when present
//! 4. The config file (`bronze.toml`, `bronze.yaml` or `bronze.yml`)
//! 5. Environment variables prefixed `BRONZE_`
//!
//! Files are searched in the working directory and then in the user config
//! directory (`~/.config/bronze` on Linux). Which extensions are searched
//! depends on the `toml-config` and `yaml-config` features.
//!
//! Environment variables nest with `__`:
//!
//! - `BRONZE_BOT__LATENCY_MS=50` sets `bot.latency_ms`
//! - `BRONZE_LOGGING__LEVEL=debug` sets `logging.level`
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .file("deploy/bronze.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::BronzeConfig;

/// Deployment profile, read from `BRONZE_PROFILE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn from_env() -> Self {
        std::env::var("BRONZE_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder over the figment sources.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    config_file: Option<PathBuf>,
    load_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            config_file: None,
            load_env: true,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search. Setting any replaces the default
    /// working directory and user config directory.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching; it must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Layers `config` over the defaults, below files and environment.
    pub fn merge(mut self, config: BronzeConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    pub fn load(self) -> ConfigResult<BronzeConfig> {
        let profile = self.profile.clone();
        let config: BronzeConfig = self.figment()?.extract()?;
        debug!(
            %profile,
            drivers = config.drivers.len(),
            log_level = %config.logging.level,
            "configuration loaded"
        );
        Ok(config)
    }

    fn figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(BronzeConfig::default()))
            .merge(std::mem::take(&mut self.overrides));

        match &self.config_file {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "loading configuration file");
                figment = merge_file(figment, path)?;
            }
            Some(path) => return Err(ConfigError::FileNotFound(path.clone())),
            None => figment = self.search(figment),
        }

        if self.load_env {
            figment = figment.merge(Env::prefixed("BRONZE_").split("__"));
        }
        Ok(figment)
    }

    fn search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("bronze"));
        }
        paths
    }

    /// Merges the first config file found, preceded by its profile variant.
    #[allow(unused_mut)]
    fn search(&self, mut figment: Figment) -> Figment {
        let mut names: Vec<&str> = Vec::new();
        #[cfg(feature = "toml-config")]
        names.push("toml");
        #[cfg(feature = "yaml-config")]
        names.extend(["yaml", "yml"]);

        for dir in self.search_paths() {
            for ext in &names {
                let profiled = dir.join(format!("bronze.{}.{ext}", self.profile));
                let base = dir.join(format!("bronze.{ext}"));
                if !base.exists() {
                    continue;
                }
                if profiled.exists() {
                    debug!(path = %profiled.display(), "loading profile configuration");
                    figment = merge_searched(figment, &profiled);
                }
                info!(path = %base.display(), "loading configuration file");
                return merge_searched(figment, &base);
            }
        }
        warn!("no configuration file found, using defaults");
        figment
    }
}

/// Merges one file, dispatching on its extension.
fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Merges a searched file, skipping it with a warning on failure.
fn merge_searched(figment: Figment, path: &Path) -> Figment {
    match merge_file(figment.clone(), path) {
        Ok(merged) => merged,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping configuration file");
            figment
        }
    }
}

/// Loads from the default locations.
pub fn load_config() -> ConfigResult<BronzeConfig> {
    ConfigLoader::new().load()
}

/// Loads one specific file, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<BronzeConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;
    use crate::config::DriverConfig;

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();
            assert_eq!(config.logging.level, "info");
            assert_eq!(config.bot.command_prefix, "/");
            assert!(config.drivers.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("BRONZE_BOT__LATENCY_MS", "25");
            jail.set_env("BRONZE_LOGGING__LEVEL", "debug");
            let config = ConfigLoader::new().search_path(jail.directory()).load().unwrap();
            assert_eq!(config.bot.latency_ms, 25);
            assert_eq!(config.logging.level, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_merge_below_env() {
        Jail::expect_with(|jail| {
            jail.set_env("BRONZE_BOT__COMMAND_PREFIX", "!");
            let mut base = BronzeConfig::default();
            base.bot.command_prefix = "#".into();
            base.bot.ring_len = 16;
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .merge(base)
                .load()
                .unwrap();
            assert_eq!(config.bot.command_prefix, "!");
            assert_eq!(config.bot.ring_len, 16);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = ConfigLoader::new().file("/nonexistent/bronze.toml").load().unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bronze.toml",
                r#"
                [bot]
                nickname = ["bronze"]
                super_users = [10001]

                [[drivers]]
                type = "ws-client"
                url = "ws://127.0.0.1:6700"
                "#,
            )?;
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();
            assert_eq!(config.bot.nickname, ["bronze"]);
            assert!(config.bot.is_super_user(10001));
            assert!(matches!(
                &config.drivers[0],
                DriverConfig::WsClient(ws) if ws.access_token.is_none()
            ));
            Ok(())
        });
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(Profile::parse("prod"), Profile::Production);
        assert_eq!(Profile::parse("Dev"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }
}
