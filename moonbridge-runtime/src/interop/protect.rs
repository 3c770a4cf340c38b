//! Error protection - status codes in, host error handling out
//!
//! A failed load or call leaves exactly one error value on top of the stack.
//! Protect pops that one slot (the stack below it belongs to the caller and
//! is left alone) and hands the message to the configured handler. Protect
//! never decides the response itself.

use std::cell::{Cell, RefCell};
use std::ffi::c_int;
use std::fmt;
use std::rc::Rc;

use super::abi::{Stack, TypeTag};
use crate::error::{Error, Result};
use crate::ffi::sys;
use crate::logging::{debug, log_runtime_error};

/// Message used when the error value is neither a string nor a number
pub const PLACEHOLDER_MESSAGE: &str = "(error object is not a string)";

/// Runtime status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Yield,
    /// Error raised while running
    Runtime,
    /// Error while precompiling
    Syntax,
    /// Allocation failure
    Memory,
    /// Error while running the message handler
    Handler,
    Unknown(c_int),
}

impl Status {
    pub const fn from_code(code: c_int) -> Self {
        match code {
            sys::LUA_OK => Self::Ok,
            sys::LUA_YIELD => Self::Yield,
            sys::LUA_ERRRUN => Self::Runtime,
            sys::LUA_ERRSYNTAX => Self::Syntax,
            sys::LUA_ERRMEM => Self::Memory,
            sys::LUA_ERRERR => Self::Handler,
            other => Self::Unknown(other),
        }
    }

    pub const fn code(self) -> c_int {
        match self {
            Self::Ok => sys::LUA_OK,
            Self::Yield => sys::LUA_YIELD,
            Self::Runtime => sys::LUA_ERRRUN,
            Self::Syntax => sys::LUA_ERRSYNTAX,
            Self::Memory => sys::LUA_ERRMEM,
            Self::Handler => sys::LUA_ERRERR,
            Self::Unknown(code) => code,
        }
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Yield => "yield",
            Self::Runtime => "runtime error",
            Self::Syntax => "syntax error",
            Self::Memory => "memory error",
            Self::Handler => "error handler error",
            Self::Unknown(_) => "unknown status",
        }
    }
}

/// A failed load, call or evaluation as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFailure {
    pub status: Status,
    pub message: String,
}

impl RuntimeFailure {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuntimeFailure {}

/// Host-supplied reaction to a runtime failure.
///
/// Returning `Ok(())` absorbs the failure (fail-open); returning an error
/// makes it propagate out of the operation that triggered it (fail-closed).
pub type ErrorHandler = Rc<dyn Fn(&RuntimeFailure) -> Result<()>>;

/// Convert every failure into `Error::Runtime`
pub fn fail_closed() -> ErrorHandler {
    Rc::new(|failure: &RuntimeFailure| Err(Error::Runtime(failure.clone())))
}

/// Log the failure and continue
pub fn logging() -> ErrorHandler {
    Rc::new(|failure: &RuntimeFailure| {
        log_runtime_error(failure.status.name(), &failure.message);
        Ok(())
    })
}

/// Ignore the failure entirely
pub fn silent() -> ErrorHandler {
    Rc::new(|_: &RuntimeFailure| Ok(()))
}

/// Detects failed runtime calls and delegates them to the handler
pub struct Protector {
    handler: RefCell<Option<ErrorHandler>>,
    failures: Cell<u64>,
}

impl Protector {
    pub fn new(handler: Option<ErrorHandler>) -> Self {
        Self {
            handler: RefCell::new(handler),
            failures: Cell::new(0),
        }
    }

    /// Install a new handler, returning the previous one
    pub fn set_handler(&self, handler: Option<ErrorHandler>) -> Option<ErrorHandler> {
        self.handler.replace(handler)
    }

    pub fn has_handler(&self) -> bool {
        self.handler.borrow().is_some()
    }

    /// Number of failures seen so far
    pub fn failures(&self) -> u64 {
        self.failures.get()
    }

    /// Inspect a status code returned by a fallible runtime call.
    ///
    /// On failure the error value on top of `stack` is consumed.
    pub fn protect(&self, stack: Stack<'_>, status: c_int) -> Result<()> {
        let status = Status::from_code(status);
        if status.is_ok() {
            return Ok(());
        }

        let message = error_message(stack, -1);
        stack.pop(1);
        self.failures.set(self.failures.get() + 1);

        let failure = RuntimeFailure { status, message };

        // Cloned out so the handler may re-enter the runtime freely.
        let handler = self.handler.borrow().clone();
        match handler {
            Some(handler) => handler(&failure),
            None => {
                debug!(
                    event = "failure_absorbed",
                    status = failure.status.name(),
                    message = %failure.message,
                    "no error handler configured"
                );
                Ok(())
            }
        }
    }
}

impl Default for Protector {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for Protector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protector")
            .field("has_handler", &self.has_handler())
            .field("failures", &self.failures.get())
            .finish()
    }
}

/// Coerce the error value at `index` to a message
pub(crate) fn error_message(stack: Stack<'_>, index: c_int) -> String {
    match stack.type_of(index) {
        TypeTag::String | TypeTag::Number => stack
            .to_string_lossy(index)
            .unwrap_or_else(|| PLACEHOLDER_MESSAGE.to_string()),
        _ => PLACEHOLDER_MESSAGE.to_string(),
    }
}
