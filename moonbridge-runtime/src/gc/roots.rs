//! Root tracking - the registry anchors that keep runtime objects alive
//!
//! Every live `Reference` owns one anchor key in the runtime registry. The
//! set mirrors those keys on the host side so leaks and double releases are
//! visible without walking the registry.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ffi::c_void;

use crate::ffi::sys;
use crate::interop::Stack;

/// Host-side mirror of the registry anchors owned by one runtime
#[derive(Debug, Default)]
pub struct Roots {
    keys: RefCell<HashSet<usize>>,
    acquired: Cell<u64>,
    released: Cell<u64>,
}

impl Roots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new anchor
    pub(crate) fn insert(&self, key: usize) {
        let fresh = self.keys.borrow_mut().insert(key);
        debug_assert!(fresh, "anchor {:#x} registered twice", key);
        self.acquired.set(self.acquired.get() + 1);
    }

    /// Forget an anchor; returns whether it was known
    pub(crate) fn remove(&self, key: usize) -> bool {
        let known = self.keys.borrow_mut().remove(&key);
        if known {
            self.released.set(self.released.get() + 1);
        }
        known
    }

    #[inline]
    pub fn contains(&self, key: usize) -> bool {
        self.keys.borrow().contains(&key)
    }

    /// Anchors currently held
    #[inline]
    pub fn live_count(&self) -> usize {
        self.keys.borrow().len()
    }

    /// Anchors ever taken
    pub fn acquired(&self) -> u64 {
        self.acquired.get()
    }

    /// Anchors ever given back
    pub fn released(&self) -> u64 {
        self.released.get()
    }
}

/// Whether the runtime registry holds a value under `key`
pub fn registry_contains(stack: Stack<'_>, key: usize) -> bool {
    let _guard = stack.guard();
    if stack.reserve(1).is_err() {
        return false;
    }
    unsafe {
        sys::lua_pushlightuserdata(stack.as_ptr(), key as *mut c_void);
        sys::lua_rawget(stack.as_ptr(), sys::LUA_REGISTRYINDEX);
    }
    let present = !stack.type_of(-1).is_nil_or_none();
    stack.pop(1);
    present
}
