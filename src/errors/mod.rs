//! Errors raised by the facade crate outside of runtime operations

use std::path::PathBuf;

pub use moonbridge_runtime::{Error, Result};

/// Failure to locate, read or interpret a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{key}`: {value}")]
    InvalidValue { key: &'static str, value: String },
}
