//! Logging setup over `tracing-subscriber`.
//!
//! ```rust,ignore
//! use bronze_runtime::logging::LoggingBuilder;
//!
//! let _guard = LoggingBuilder::new()
//!     .with_level(tracing::Level::DEBUG)
//!     .directive("bronze_transport=trace")
//!     .init();
//! ```
//!
//! `RUST_LOG`, when set, replaces the base level; directives are added on
//! top of it. File output goes through a non-blocking `tracing-appender`
//! writer that is flushed when the returned [`LoggingGuard`] drops.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LogOutput, LoggingConfig};

/// Keeps the file writer alive; hold it for the life of the process.
#[must_use = "dropping the guard stops file logging"]
#[derive(Default)]
pub struct LoggingGuard {
    _worker: Option<WorkerGuard>,
}

/// Initializes logging from configuration, ignoring a subscriber that is
/// already installed.
pub fn init_from_config(config: &LoggingConfig) -> LoggingGuard {
    LoggingBuilder::from_config(config).init()
}

/// A builder for the global subscriber.
pub struct LoggingBuilder {
    level: tracing::Level,
    directives: Vec<String>,
    format: LogFormat,
    output: LogOutput,
    file_path: Option<PathBuf>,
    with_target: bool,
    with_thread_ids: bool,
    with_file: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self {
            level: tracing::Level::INFO,
            directives: Vec::new(),
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            with_target: true,
            with_thread_ids: false,
            with_file: false,
        }
    }

    /// Invalid levels fall back to `info`; run [`validate_config`] first to
    /// reject them instead.
    ///
    /// [`validate_config`]: crate::config::validate_config
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new();
        builder.level = tracing::Level::from_str(&config.level).unwrap_or(tracing::Level::INFO);
        builder.format = config.format;
        builder.output = config.output;
        builder.file_path.clone_from(&config.file_path);
        builder.with_thread_ids = config.thread_ids;
        builder.with_file = config.file_location;
        builder.directives = config
            .filters
            .iter()
            .map(|(target, level)| format!("{target}={}", level.to_lowercase()))
            .collect();
        builder
    }

    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// Adds a filter directive such as `bronze_core=debug`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self.output = LogOutput::File;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    /// Include source file and line.
    pub fn with_file(mut self, enabled: bool) -> Self {
        self.with_file = enabled;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let base = self.level.to_string().to_lowercase();
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base));
        for directive in &self.directives {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("ignoring log directive '{directive}': {e}"),
            }
        }
        filter
    }

    /// Installs the subscriber; a second call is a no-op.
    pub fn init(self) -> LoggingGuard {
        self.try_init().unwrap_or_default()
    }

    pub fn try_init(self) -> Result<LoggingGuard, TryInitError> {
        let filter = self.build_filter();

        macro_rules! text_layer {
            ($layer:expr) => {
                $layer
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids)
                    .with_file(self.with_file)
                    .with_line_number(self.with_file)
            };
        }

        macro_rules! install {
            ($writer:expr) => {
                match self.format {
                    #[cfg(feature = "json-log")]
                    LogFormat::Json => tracing_subscriber::registry()
                        .with(fmt::layer().json().with_writer($writer))
                        .with(filter)
                        .try_init(),
                    #[cfg(not(feature = "json-log"))]
                    LogFormat::Json | LogFormat::Full => tracing_subscriber::registry()
                        .with(text_layer!(fmt::layer().with_writer($writer)))
                        .with(filter)
                        .try_init(),
                    #[cfg(feature = "json-log")]
                    LogFormat::Full => tracing_subscriber::registry()
                        .with(text_layer!(fmt::layer().with_writer($writer)))
                        .with(filter)
                        .try_init(),
                    LogFormat::Compact => tracing_subscriber::registry()
                        .with(text_layer!(fmt::layer().compact().with_writer($writer)))
                        .with(filter)
                        .try_init(),
                    LogFormat::Pretty => tracing_subscriber::registry()
                        .with(text_layer!(fmt::layer().pretty().with_writer($writer)))
                        .with(filter)
                        .try_init(),
                }
            };
        }

        match (self.output, self.file_path.as_deref()) {
            (LogOutput::Stdout, _) => install!(std::io::stdout).map(|_| LoggingGuard::default()),
            (LogOutput::Stderr, _) => install!(std::io::stderr).map(|_| LoggingGuard::default()),
            (LogOutput::File, Some(path)) => {
                let appender = tracing_appender::rolling::never(
                    path.parent().unwrap_or_else(|| Path::new(".")),
                    path.file_name().unwrap_or_else(|| OsStr::new("bronze.log")),
                );
                let (writer, worker) = tracing_appender::non_blocking(appender);
                install!(writer).map(|_| LoggingGuard {
                    _worker: Some(worker),
                })
            }
            (LogOutput::File, None) => {
                eprintln!("file logging requested without a file path, using stdout");
                install!(std::io::stdout).map(|_| LoggingGuard::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = LoggingConfig {
            level: "warn".into(),
            format: LogFormat::Pretty,
            thread_ids: true,
            ..Default::default()
        };
        config.filters.insert("bronze_core".into(), "TRACE".into());

        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, tracing::Level::WARN);
        assert_eq!(builder.format, LogFormat::Pretty);
        assert!(builder.with_thread_ids);
        assert_eq!(builder.directives, ["bronze_core=trace"]);
    }

    #[test]
    fn test_bad_level_falls_back() {
        let config = LoggingConfig {
            level: "loud".into(),
            ..Default::default()
        };
        assert_eq!(LoggingBuilder::from_config(&config).level, tracing::Level::INFO);
    }

    #[test]
    fn test_file_path_switches_output() {
        let builder = LoggingBuilder::new().file_path("/tmp/bronze/bronze.log");
        assert_eq!(builder.output, LogOutput::File);
    }
}
