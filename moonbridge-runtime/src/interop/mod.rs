//! Interoperability - values and calls across the runtime boundary
//!
//! Design: every crossing goes through the runtime's value stack
//!
//! Architecture:
//! - `abi.rs` - Stack protocol (indices, type tags, balance guards)
//! - `types.rs` - Variant, the closed set of boundary values
//! - `marshal.rs` - Variant ↔ stack conversions
//! - `convert.rs` - Typed parameter extraction and result pushing
//! - `call.rs` - Function wrappers and the shared dispatch entry point
//! - `protect.rs` - Status codes to host error handling
//! - `loader.rs` - Chunk loading from text and streams

mod abi;
mod types;
pub mod marshal;
mod convert;
mod call;
mod protect;
mod loader;

pub use abi::{Stack, StackGuard, TypeTag};
pub use types::{Kind, Variant};
pub use marshal::MarshalMode;
pub use convert::{pop_param, ArgMismatch, FromStack, HostFunction, IntoArgs, Mismatch, Params, ToStack};
pub use call::{create_function, install, wrap, DispatchTable, FunctionWrapper, Wrapper};
pub use protect::{
    fail_closed, logging, silent, ErrorHandler, Protector, RuntimeFailure, Status, PLACEHOLDER_MESSAGE,
};
pub use loader::{load_reader, load_source, EVAL_CHUNK};

#[cfg(test)]
mod tests;
