//! Tracing subscriber setup.
//!
//! The orchestrator itself only *emits* `tracing` events; nothing in the
//! request path touches the subscriber. This module is for binaries and tests
//! that want a ready-made setup: console or file output, text or JSON, with
//! an env-filter scoped to this crate.
//!
//! ```rust,ignore
//! use charsiu::telemetry::{SubscriberConfig, init_subscriber};
//!
//! // Keep the guard alive for the lifetime of the program when logging to a
//! // file; dropping it flushes and stops the background writer.
//! let _guard = init_subscriber(SubscriberConfig::default())?;
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;

use crate::error::OrchestratorError;

/// Output format for subscriber logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
    /// JSON with event fields flattened into the top-level object.
    JsonFlat,
}

/// Subscriber configuration.
///
/// When `log_file` is set, output goes to that file through a non-blocking
/// writer; otherwise it goes to stdout.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub log_level: tracing::Level,
    pub output_format: OutputFormat,
    pub log_file: Option<PathBuf>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            output_format: OutputFormat::Text,
            log_file: None,
        }
    }
}

impl SubscriberConfig {
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder::default()
    }

    /// Verbose text output for local debugging.
    pub fn debug() -> Self {
        Self {
            log_level: tracing::Level::DEBUG,
            output_format: OutputFormat::Text,
            log_file: None,
        }
    }

    /// JSON to a file, warnings and up.
    pub fn production(log_file: PathBuf) -> Self {
        Self {
            log_level: tracing::Level::WARN,
            output_format: OutputFormat::Json,
            log_file: Some(log_file),
        }
    }
}

#[derive(Debug, Default)]
pub struct SubscriberConfigBuilder {
    log_level: Option<tracing::Level>,
    output_format: Option<OutputFormat>,
    log_file: Option<PathBuf>,
}

impl SubscriberConfigBuilder {
    pub fn log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Set the log level from its name.
    pub fn log_level_str(mut self, level: &str) -> Result<Self, OrchestratorError> {
        let level = match level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                return Err(OrchestratorError::Configuration(format!(
                    "invalid log level: {level}. valid options: trace, debug, info, warn, error"
                )));
            }
        };
        self.log_level = Some(level);
        Ok(self)
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    pub fn build(self) -> SubscriberConfig {
        SubscriberConfig {
            log_level: self.log_level.unwrap_or(tracing::Level::INFO),
            output_format: self.output_format.unwrap_or_default(),
            log_file: self.log_file,
        }
    }
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when file logging is enabled; hold it for
/// the lifetime of the program. A subscriber installed earlier (by a test
/// harness, typically) is not an error; the call becomes a no-op.
pub fn init_subscriber(
    config: SubscriberConfig,
) -> Result<Option<WorkerGuard>, OrchestratorError> {
    let filter = format!("charsiu={}", config.log_level);

    let (writer, guard) = match &config.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(OsString::from)
                .unwrap_or_else(|| OsString::from("charsiu.log"));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let init_result = match (config.output_format, writer) {
        (OutputFormat::Text, Some(writer)) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(writer)
            .try_init(),
        (OutputFormat::Text, None) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        (OutputFormat::Json, Some(writer)) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(writer)
            .json()
            .try_init(),
        (OutputFormat::Json, None) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init(),
        (OutputFormat::JsonFlat, Some(writer)) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(writer)
            .json()
            .flatten_event(true)
            .try_init(),
        (OutputFormat::JsonFlat, None) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .flatten_event(true)
            .try_init(),
    };

    match init_result {
        Ok(()) => Ok(guard),
        Err(e) => {
            if e.to_string()
                .contains("global default trace dispatcher has already been set")
            {
                Ok(None)
            } else {
                Err(OrchestratorError::Configuration(format!(
                    "failed to initialize tracing: {e}"
                )))
            }
        }
    }
}

/// Text console output at `INFO`.
pub fn init_default() -> Result<Option<WorkerGuard>, OrchestratorError> {
    init_subscriber(SubscriberConfig::default())
}

/// Build the configuration from `CHARSIU_LOG_LEVEL`, `CHARSIU_LOG_FORMAT`
/// (`text`, `json`, `json-flat`) and `CHARSIU_LOG_FILE`, then install it.
pub fn init_from_env() -> Result<Option<WorkerGuard>, OrchestratorError> {
    let mut builder = SubscriberConfig::builder();

    if let Ok(level) = std::env::var("CHARSIU_LOG_LEVEL") {
        builder = builder.log_level_str(&level)?;
    }

    if let Ok(format) = std::env::var("CHARSIU_LOG_FORMAT") {
        let output_format = match format.to_lowercase().as_str() {
            "text" => OutputFormat::Text,
            "json" => OutputFormat::Json,
            "json-flat" => OutputFormat::JsonFlat,
            _ => {
                return Err(OrchestratorError::Configuration(format!(
                    "invalid log format: {format}. valid options: text, json, json-flat"
                )));
            }
        };
        builder = builder.output_format(output_format);
    }

    if let Ok(path) = std::env::var("CHARSIU_LOG_FILE") {
        builder = builder.log_file(PathBuf::from(path));
    }

    init_subscriber(builder.build())
}
