//! Moonbridge Runtime - stack-level bridge to an embedded Lua runtime
//!
//! This crate provides the pieces the session facade is built from:
//! value marshalling, reference handles, table views, host function
//! dispatch and error protection, all in terms of one runtime's stack.

pub mod error;
pub mod ffi;
pub mod gc;
pub mod interop;
pub mod logging;
pub mod state;

// Re-export core types
pub use error::{Error, Result};
pub use ffi::{Reference, Table, TableEntry};
pub use interop::{
    ErrorHandler, FromStack, HostFunction, IntoArgs, Kind, MarshalMode, RuntimeFailure, Stack, Status,
    ToStack, Variant,
};
pub use state::{RuntimeState, StateOptions};
