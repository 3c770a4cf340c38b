//! Chunk loading - source text and byte streams to runtime functions
//!
//! Both loaders leave exactly one slot on the stack: the compiled chunk on
//! success, the error value on failure. The caller runs the status through
//! the protector. Only text chunks are accepted; precompiled bytecode is
//! refused by the runtime.

use std::ffi::{c_char, c_int, c_void};
use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};

use super::abi::Stack;
use crate::error::{Error, Result};
use crate::ffi::{c_name, sys};
use crate::logging::trace;

/// Chunk name used for source evaluated without a name
pub const EVAL_CHUNK: &str = "=(eval)";

const TEXT_ONLY: &[u8] = b"t\0";
const READ_BUFFER: usize = 4096;

/// Compile `source`; returns the raw load status
pub fn load_source(stack: Stack<'_>, source: &str, chunk_name: &str) -> Result<c_int> {
    let name = c_name(chunk_name)?;
    stack.reserve(1)?;
    let status = unsafe {
        sys::luaL_loadbufferx(
            stack.as_ptr(),
            source.as_ptr().cast(),
            source.len(),
            name.as_ptr(),
            TEXT_ONLY.as_ptr().cast(),
        )
    };
    trace!(event = "chunk_load", chunk = chunk_name, bytes = source.len(), status);
    Ok(status)
}

struct ReaderState<'r> {
    source: &'r mut dyn Read,
    buffer: Box<[u8]>,
    error: Option<io::Error>,
    total: usize,
}

unsafe extern "C-unwind" fn read_chunk(
    _l: *mut sys::lua_State,
    data: *mut c_void,
    size: *mut usize,
) -> *const c_char {
    let state = &mut *data.cast::<ReaderState<'_>>();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| loop {
        match state.source.read(&mut state.buffer) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            other => break other,
        }
    }));

    let read = match outcome {
        Ok(Ok(n)) => n,
        Ok(Err(err)) => {
            state.error = Some(err);
            0
        }
        Err(_) => {
            state.error = Some(io::Error::new(io::ErrorKind::Other, "reader panicked"));
            0
        }
    };

    state.total += read;
    *size = read;
    if read == 0 {
        core::ptr::null()
    } else {
        state.buffer.as_ptr().cast()
    }
}

/// Compile a chunk streamed from `source`; returns the raw load status.
///
/// An I/O failure ends the stream early. The partially compiled result is
/// discarded and the failure is returned as `Error::Io`, leaving the stack
/// as it was found.
pub fn load_reader(stack: Stack<'_>, source: &mut dyn Read, chunk_name: &str) -> Result<c_int> {
    let name = c_name(chunk_name)?;
    stack.reserve(1)?;

    let mut state = ReaderState {
        source,
        buffer: vec![0u8; READ_BUFFER].into_boxed_slice(),
        error: None,
        total: 0,
    };
    let status = unsafe {
        sys::lua_load(
            stack.as_ptr(),
            read_chunk,
            (&mut state as *mut ReaderState<'_>).cast(),
            name.as_ptr(),
            TEXT_ONLY.as_ptr().cast(),
        )
    };
    trace!(event = "chunk_load", chunk = chunk_name, bytes = state.total, status);

    if let Some(err) = state.error.take() {
        stack.pop(1);
        return Err(Error::Io(err));
    }
    Ok(status)
}
