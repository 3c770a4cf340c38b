//! C FFI - raw runtime bindings and the handles built on them
//!
//! Design: everything that owns a claim on a runtime object lives here:
//! 1. Raw entry points (`sys`)
//! 2. Reference handles keyed in the runtime registry (`refcount`)
//! 3. Keyed table views layered on handles (`object`)

pub mod sys;
mod refcount;
mod object;

pub use refcount::Reference;
pub use object::{push_field, store_field, Table, TableEntry};

use core::ptr::NonNull;
use std::ffi::CString;

use crate::error::{Error, Result};

/// Convert a global or field name for the C API.
pub(crate) fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| Error::InvalidName(name.to_string()))
}

/// Convert raw pointer to NonNull (internal helper)
#[inline(always)]
pub(crate) fn ptr_to_nonnull<T>(ptr: *mut T) -> Option<NonNull<T>> {
    NonNull::new(ptr)
}
