//! Standardized logging infrastructure for moonbridge
//!
//! This module provides a consistent logging interface using the `tracing` crate,
//! with support for structured logging, multiple output formats, and flexible configuration.

use std::path::Path;

use serde::Deserialize;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format with timestamps
    Pretty,
    /// Compact format for production
    #[default]
    Compact,
    /// JSON format for structured logging
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
    /// File with rotation (daily)
    File { directory: String, prefix: String },
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: LogFormat,
    /// Output destination
    pub output: LogOutput,
    /// Whether to include span events
    pub span_events: bool,
    /// Custom filter directives (e.g., "moonbridge=debug,moonbridge_runtime=trace")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Initialize the global logging system
///
/// Returns a `WorkerGuard` that must be kept alive for the duration of the program
/// to ensure all logs are flushed. If a global subscriber is already installed
/// the existing one is kept.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let filter = build_filter(&config);

    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File { directory, prefix } => {
            tracing_appender::non_blocking(rolling::daily(directory, prefix))
        }
    };

    install(writer, &config, filter);
    Some(guard)
}

fn install<W>(writer: W, config: &LogConfig, filter: EnvFilter)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let spans = span_events_config(config.span_events);
    let base = fmt::layer().with_writer(writer).with_span_events(spans);

    let installed = match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(base.pretty().with_filter(filter))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(base.compact().with_filter(filter))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(base.json().with_filter(filter))
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("global subscriber already installed; keeping it");
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(filter_str) => filter_str.split(',').fold(base_filter, |filter, directive| {
            filter.add_directive(directive.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid filter directive: {}", directive);
                config.level.into()
            }))
        }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Initialize logging with defaults for development
pub fn init_dev_logging() -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::DEBUG,
        format: LogFormat::Pretty,
        output: LogOutput::Stderr,
        span_events: true,
        filter: Some("moonbridge=debug,moonbridge_runtime=debug".to_string()),
    })
}

/// Initialize logging with defaults for production
pub fn init_prod_logging(log_dir: impl AsRef<Path>) -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::INFO,
        format: LogFormat::Json,
        output: LogOutput::File {
            directory: log_dir.as_ref().to_string_lossy().to_string(),
            prefix: "moonbridge".to_string(),
        },
        span_events: false,
        filter: Some("moonbridge=info,moonbridge_runtime=warn".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Json)
            .with_span_events(true)
            .with_filter("moonbridge=trace");

        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.span_events);
        assert_eq!(config.filter, Some("moonbridge=trace".to_string()));
    }

    #[test]
    fn test_format_names_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: LogFormat,
        }
        let parsed: Wrapper = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(parsed.format, LogFormat::Json);
    }
}
