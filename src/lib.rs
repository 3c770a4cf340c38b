//! Moonbridge - embed a Lua runtime and trade values and functions with it
//!
//! The stack-level machinery lives in `moonbridge-runtime`; this crate adds
//! the `Session` facade, configuration, logging setup and the CLI.

pub mod errors;
pub mod frontend;
pub mod infrastructure;
pub mod session;

pub use errors::{ConfigError, Error, Result};
pub use frontend::Config;
pub use session::{Global, Session, WeakSession};

pub use moonbridge_runtime::interop::{fail_closed, logging, silent};
pub use moonbridge_runtime::{
    ErrorHandler, FromStack, Kind, MarshalMode, Reference, RuntimeFailure, Status, Table, TableEntry, ToStack,
    Variant,
};
