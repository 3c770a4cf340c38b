//! Stack protocol - the runtime's native calling convention
//!
//! Values travel across the boundary on an ordered per-thread stack.
//! Indices are 1-based from the bottom or negative from the top; every
//! operation that inspects a value without popping leaves the depth unchanged.

use core::marker::PhantomData;
use core::ptr::NonNull;
use std::borrow::Cow;
use std::ffi::{c_int, c_void};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::ffi::sys;
use crate::state::RuntimeState;

/// Runtime-reported type tag of a stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Index past the top of the stack
    None,
    Nil,
    Boolean,
    LightUserdata,
    Number,
    String,
    Table,
    Function,
    Userdata,
    Thread,
}

impl TypeTag {
    /// Map a raw `lua_type` result
    #[inline]
    pub const fn from_raw(tag: c_int) -> Self {
        match tag {
            sys::LUA_TNIL => Self::Nil,
            sys::LUA_TBOOLEAN => Self::Boolean,
            sys::LUA_TLIGHTUSERDATA => Self::LightUserdata,
            sys::LUA_TNUMBER => Self::Number,
            sys::LUA_TSTRING => Self::String,
            sys::LUA_TTABLE => Self::Table,
            sys::LUA_TFUNCTION => Self::Function,
            sys::LUA_TUSERDATA => Self::Userdata,
            sys::LUA_TTHREAD => Self::Thread,
            _ => Self::None,
        }
    }

    /// Name as the runtime's `type()` reports it
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "no value",
            Self::Nil => "nil",
            Self::Boolean => "boolean",
            Self::LightUserdata | Self::Userdata => "userdata",
            Self::Number => "number",
            Self::String => "string",
            Self::Table => "table",
            Self::Function => "function",
            Self::Thread => "thread",
        }
    }

    /// Nil or an absent slot
    #[inline]
    pub const fn is_nil_or_none(self) -> bool {
        matches!(self, Self::None | Self::Nil)
    }

    /// Object kinds that only cross the boundary through a Reference
    #[inline]
    pub const fn is_object(self) -> bool {
        matches!(
            self,
            Self::Table | Self::Function | Self::Userdata | Self::LightUserdata | Self::Thread
        )
    }
}

/// View of one runtime thread's stack, tied to its owning runtime.
///
/// The view is `Copy`; it borrows the runtime so it can never outlive the
/// state it points into. Inside a dispatched call the raw pointer is the
/// calling thread, which may be a coroutine rather than the main thread.
#[derive(Clone, Copy)]
pub struct Stack<'a> {
    raw: NonNull<sys::lua_State>,
    runtime: &'a Rc<RuntimeState>,
    _not_send: PhantomData<*mut ()>,
}

impl<'a> Stack<'a> {
    /// Wrap a raw thread pointer belonging to `runtime`
    ///
    /// # Safety
    /// `raw` must be a live thread of `runtime` for the whole of `'a`.
    #[inline]
    pub(crate) unsafe fn from_raw(raw: NonNull<sys::lua_State>, runtime: &'a Rc<RuntimeState>) -> Self {
        Self {
            raw,
            runtime,
            _not_send: PhantomData,
        }
    }

    #[inline]
    pub fn as_ptr(self) -> *mut sys::lua_State {
        self.raw.as_ptr()
    }

    /// Runtime this stack belongs to
    #[inline]
    pub fn runtime(self) -> &'a Rc<RuntimeState> {
        self.runtime
    }

    /// Current depth (index of the top slot)
    #[inline]
    pub fn top(self) -> c_int {
        unsafe { sys::lua_gettop(self.as_ptr()) }
    }

    #[inline]
    pub fn set_top(self, index: c_int) {
        unsafe { sys::lua_settop(self.as_ptr(), index) }
    }

    /// Remove exactly `n` slots from the top
    #[inline]
    pub fn pop(self, n: c_int) {
        debug_assert!(n <= self.top(), "popping {} slots from a stack of {}", n, self.top());
        unsafe { sys::lua_pop(self.as_ptr(), n) }
    }

    /// Convert a relative index into an absolute one
    #[inline]
    pub fn absolute(self, index: c_int) -> c_int {
        unsafe { sys::lua_absindex(self.as_ptr(), index) }
    }

    /// Make room for `extra` more slots
    pub fn reserve(self, extra: usize) -> Result<()> {
        let extra = c_int::try_from(extra).map_err(|_| Error::StackOverflow { requested: extra })?;
        if unsafe { sys::lua_checkstack(self.as_ptr(), extra) } == 0 {
            return Err(Error::StackOverflow { requested: extra as usize });
        }
        Ok(())
    }

    #[inline]
    pub fn type_of(self, index: c_int) -> TypeTag {
        TypeTag::from_raw(unsafe { sys::lua_type(self.as_ptr(), index) })
    }

    // ------------------------------------------------------------------
    // Push primitives
    // ------------------------------------------------------------------

    #[inline]
    pub fn push_nil(self) {
        unsafe { sys::lua_pushnil(self.as_ptr()) }
    }

    #[inline]
    pub fn push_number(self, n: f64) {
        unsafe { sys::lua_pushnumber(self.as_ptr(), n) }
    }

    #[inline]
    pub fn push_bool(self, b: bool) {
        unsafe { sys::lua_pushboolean(self.as_ptr(), c_int::from(b)) }
    }

    /// Push string data (interior NUL bytes are preserved)
    #[inline]
    pub fn push_str(self, s: &str) {
        unsafe {
            sys::lua_pushlstring(self.as_ptr(), s.as_ptr().cast(), s.len());
        }
    }

    #[inline]
    pub fn push_light_userdata(self, p: *mut c_void) {
        unsafe { sys::lua_pushlightuserdata(self.as_ptr(), p) }
    }

    /// Push a copy of the value at `index`
    #[inline]
    pub fn push_copy(self, index: c_int) {
        unsafe { sys::lua_pushvalue(self.as_ptr(), index) }
    }

    #[inline]
    pub fn push_function(self, f: sys::lua_CFunction) {
        unsafe { sys::lua_pushcfunction(self.as_ptr(), f) }
    }

    /// Push the table holding the global namespace
    #[inline]
    pub fn push_globals(self) {
        unsafe { sys::lua_pushglobaltable(self.as_ptr()) };
    }

    #[inline]
    pub fn new_table(self) {
        unsafe { sys::lua_newtable(self.as_ptr()) }
    }

    // ------------------------------------------------------------------
    // Access primitives
    // ------------------------------------------------------------------

    /// Numeric value at `index`, if it is a number or a numeric string
    #[inline]
    pub fn to_number(self, index: c_int) -> Option<f64> {
        let mut isnum: c_int = 0;
        let n = unsafe { sys::lua_tonumberx(self.as_ptr(), index, &mut isnum) };
        (isnum != 0).then_some(n)
    }

    /// Runtime truthiness: everything except nil and false
    #[inline]
    pub fn to_bool(self, index: c_int) -> bool {
        unsafe { sys::lua_toboolean(self.as_ptr(), index) != 0 }
    }

    /// Copy out string data at `index`.
    ///
    /// Numbers are converted by the runtime *in place*, so callers only use
    /// this on slots they are about to pop or that already hold strings.
    pub fn to_string_lossy(self, index: c_int) -> Option<String> {
        let mut len = 0usize;
        let ptr = unsafe { sys::lua_tolstring(self.as_ptr(), index, &mut len) };
        if ptr.is_null() {
            return None;
        }
        let bytes = unsafe { core::slice::from_raw_parts(ptr.cast::<u8>(), len) };
        Some(match String::from_utf8_lossy(bytes) {
            Cow::Borrowed(s) => s.to_owned(),
            Cow::Owned(s) => s,
        })
    }

    #[inline]
    pub fn to_userdata(self, index: c_int) -> *mut c_void {
        unsafe { sys::lua_touserdata(self.as_ptr(), index) }
    }

    /// Raw identity comparison (no metamethods)
    #[inline]
    pub fn raw_equal(self, a: c_int, b: c_int) -> bool {
        unsafe { sys::lua_rawequal(self.as_ptr(), a, b) != 0 }
    }

    /// Verify the depth is back to its current value when the guard drops
    #[inline]
    pub fn guard(self) -> StackGuard<'a> {
        StackGuard {
            stack: self,
            expected: self.top(),
        }
    }
}

impl core::fmt::Debug for Stack<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stack")
            .field("raw", &self.raw)
            .field("top", &self.top())
            .finish()
    }
}

/// Debug-build check that an operation left the stack as it found it.
///
/// Transient pushes must be matched by pops before returning; an imbalance is
/// a bug in this crate, never a recoverable condition.
pub struct StackGuard<'a> {
    stack: Stack<'a>,
    expected: c_int,
}

impl StackGuard<'_> {
    /// Depth recorded when the guard was taken
    #[inline]
    pub fn expected(&self) -> c_int {
        self.expected
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert_eq!(
                self.stack.top(),
                self.expected,
                "stack imbalance: operation left {} slots, expected {}",
                self.stack.top(),
                self.expected
            );
        }
    }
}
