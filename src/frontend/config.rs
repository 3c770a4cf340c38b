use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;
use crate::infrastructure::{LogConfig, LogFormat, LogOutput};
use moonbridge_runtime::interop::{self, ErrorHandler};
use moonbridge_runtime::logging::parse_level;
use moonbridge_runtime::{MarshalMode, StateOptions};

/// File name searched for by `Config::find_and_load`
pub const CONFIG_FILE: &str = "moonbridge.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_true")]
    pub open_libs: bool,

    #[serde(default)]
    pub error_mode: ErrorMode,

    #[serde(default)]
    pub marshal_mode: MarshalSetting,
}

/// What a session does with a failed load, call or evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Propagate the failure to the caller
    #[default]
    FailClosed,
    /// Log it and continue
    Log,
    /// Drop it without a trace
    Silent,
    /// No handler at all
    Absorb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarshalSetting {
    #[default]
    Lossy,
    Strict,
    Promote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Write rotated log files here instead of stderr
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_libs: true,
            error_mode: ErrorMode::default(),
            marshal_mode: MarshalSetting::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            directory: None,
        }
    }
}

fn default_true() -> bool { true }
fn default_level() -> String { "warn".to_string() }

impl ErrorMode {
    /// Handler implementing this mode
    pub fn handler(self) -> Option<ErrorHandler> {
        match self {
            Self::FailClosed => Some(interop::fail_closed()),
            Self::Log => Some(interop::logging()),
            Self::Silent => Some(interop::silent()),
            Self::Absorb => None,
        }
    }
}

impl From<MarshalSetting> for MarshalMode {
    fn from(setting: MarshalSetting) -> Self {
        match setting {
            MarshalSetting::Lossy => MarshalMode::Lossy,
            MarshalSetting::Strict => MarshalMode::Strict,
            MarshalSetting::Promote => MarshalMode::Promote,
        }
    }
}

impl SessionConfig {
    pub fn state_options(&self) -> StateOptions {
        StateOptions {
            open_libs: self.open_libs,
            marshal_mode: self.marshal_mode.into(),
        }
    }
}

impl LoggingConfig {
    /// Translate into a subscriber configuration
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level = parse_level(&self.level).ok_or_else(|| ConfigError::InvalidValue {
            key: "logging.level",
            value: self.level.clone(),
        })?;

        let output = match &self.directory {
            Some(dir) => LogOutput::File {
                directory: dir.to_string_lossy().to_string(),
                prefix: "moonbridge".to_string(),
            },
            None => LogOutput::Stderr,
        };

        Ok(LogConfig::new()
            .with_level(level)
            .with_format(self.format)
            .with_output(output))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        // Fail on a bad level at load time rather than at logging setup.
        config.logging.to_log_config()?;
        Ok(config)
    }

    /// Find `moonbridge.toml` in `start` or its parents and load it.
    ///
    /// Returns `Ok(None)` when no file exists; a file that exists but does
    /// not parse is an error.
    pub fn find_and_load(start: &Path) -> Result<Option<Self>, ConfigError> {
        let mut current = Some(start);

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.is_file() {
                return Self::from_file(&config_path).map(Some);
            }
            current = dir.parent();
        }

        Ok(None)
    }
}
