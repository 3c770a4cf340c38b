//! Garbage collection control
//!
//! Design: the runtime owns its own incremental collector. The host side
//! only keeps roots (`roots`) and occasionally asks for a full cycle, which
//! is how released references become observable.

mod roots;

pub use roots::{registry_contains, Roots};

use std::ffi::c_int;
use std::time::Instant;

use crate::ffi::sys;
use crate::interop::Stack;
use crate::logging::log_gc_complete;

/// Run a full collection cycle
pub fn collect(stack: Stack<'_>) {
    let before = memory_in_use(stack);
    let start = Instant::now();
    unsafe {
        sys::lua_gc(stack.as_ptr(), sys::LUA_GCCOLLECT, 0 as c_int);
    }
    let after = memory_in_use(stack);
    log_gc_complete(start.elapsed().as_micros() as u64, before, after);
}

/// Bytes currently allocated by the runtime
pub fn memory_in_use(stack: Stack<'_>) -> usize {
    let (kb, rem) = unsafe {
        (
            sys::lua_gc(stack.as_ptr(), sys::LUA_GCCOUNT, 0 as c_int),
            sys::lua_gc(stack.as_ptr(), sys::LUA_GCCOUNTB, 0 as c_int),
        )
    };
    usize::try_from(kb).unwrap_or(0) * 1024 + usize::try_from(rem).unwrap_or(0)
}
