//! Command-line front end and configuration

pub mod cli;
pub mod config;

pub use cli::{cli_main, parse_args, Chunk, Cli, CliConfig};
pub use config::{Config, ErrorMode, LoggingConfig, MarshalSetting, SessionConfig};
