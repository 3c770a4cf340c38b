//! Error types for the bridge

use crate::interop::RuntimeFailure;

/// Result type for bridge operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Bridge error taxonomy
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The embedded script raised an error, or a protected load/call failed
    #[error("runtime error: {0}")]
    Runtime(RuntimeFailure),

    /// A stack value does not fit the requested Variant kind (strict mode)
    #[error("cannot marshal a {found} value as {expected}")]
    Marshal {
        expected: &'static str,
        found: &'static str,
    },

    /// A registered function was called with the wrong number of arguments
    #[error("bad argument count to '{function}' (expected {expected}, got {found})")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    /// A registered function received an argument it cannot convert
    #[error("bad argument #{position} to '{function}' ({expected} expected, got {found})")]
    ArgType {
        function: String,
        position: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// Global and chunk names cross the C boundary as NUL-terminated strings
    #[error("invalid name {0:?}: names must not contain NUL bytes")]
    InvalidName(String),

    /// The stack cannot grow by the requested number of slots
    #[error("runtime stack overflow (requested {requested} extra slots)")]
    StackOverflow { requested: usize },

    /// Reading a source stream failed
    #[error("failed to read chunk: {0}")]
    Io(#[from] std::io::Error),

    /// A host callable reported a failure
    #[error("{0}")]
    Callback(String),

    /// The runtime allocator refused to create a new state
    #[error("failed to create runtime state")]
    StateCreation,
}

impl Error {
    /// Convenience constructor for host callables
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }

    /// The runtime failure behind this error, if any
    pub fn as_runtime(&self) -> Option<&RuntimeFailure> {
        match self {
            Self::Runtime(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<RuntimeFailure> for Error {
    fn from(failure: RuntimeFailure) -> Self {
        Self::Runtime(failure)
    }
}
