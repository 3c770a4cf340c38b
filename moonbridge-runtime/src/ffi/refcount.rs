//! Reference handles - host-held claims on runtime-owned objects
//!
//! Hot path operations with minimal overhead. One acquisition creates one
//! registry anchor; clones share it through a reference count, and the entry
//! is removed when the last clone drops. While any clone lives, the collector
//! cannot reclaim the object.

use std::ffi::{c_int, c_void};
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::ffi::sys;
use crate::interop::{Stack, TypeTag};
use crate::logging::{log_reference, warn};
use crate::state::RuntimeState;

/// Registry anchor. Its heap address doubles as the registry key.
struct Anchor {
    runtime: Rc<RuntimeState>,
    tag: TypeTag,
}

impl Anchor {
    #[inline]
    fn key(&self) -> usize {
        self as *const Self as usize
    }
}

impl Drop for Anchor {
    fn drop(&mut self) {
        let key = self.key();
        let stack = self.runtime.stack();
        let _guard = stack.guard();
        // Clearing a key never needs more than the minimum stack, which a
        // host-side drop always has available.
        unsafe {
            sys::lua_pushlightuserdata(stack.as_ptr(), key as *mut c_void);
            sys::lua_pushnil(stack.as_ptr());
            sys::lua_rawset(stack.as_ptr(), sys::LUA_REGISTRYINDEX);
        }
        self.runtime.roots().remove(key);
        log_reference("reference_release", key);
    }
}

/// Strong, cloneable handle to an object owned by the runtime
#[derive(Clone)]
pub struct Reference {
    anchor: Rc<Anchor>,
}

impl Reference {
    /// Take a claim on the value at `index`, leaving the stack unchanged.
    ///
    /// Any non-nil value may be referenced; scalars simply round-trip.
    pub fn acquire(stack: Stack<'_>, index: c_int) -> Result<Self> {
        let tag = stack.type_of(index);
        if tag.is_nil_or_none() {
            return Err(Error::Marshal {
                expected: "a value",
                found: tag.name(),
            });
        }
        let index = stack.absolute(index);
        stack.reserve(2)?;

        let anchor = Rc::new(Anchor {
            runtime: Rc::clone(stack.runtime()),
            tag,
        });
        let key = anchor.key();

        let _guard = stack.guard();
        unsafe {
            sys::lua_pushlightuserdata(stack.as_ptr(), key as *mut c_void);
            sys::lua_pushvalue(stack.as_ptr(), index);
            sys::lua_rawset(stack.as_ptr(), sys::LUA_REGISTRYINDEX);
        }
        stack.runtime().roots().insert(key);
        log_reference("reference_acquire", key);

        Ok(Self { anchor })
    }

    /// Push the referenced object onto `stack`.
    ///
    /// # Panics
    /// If `stack` belongs to a different runtime than the one the reference
    /// was acquired from. Objects never move between interpreters.
    pub fn push(&self, stack: Stack<'_>) {
        assert!(
            Rc::ptr_eq(stack.runtime(), &self.anchor.runtime),
            "reference from runtime {} pushed into runtime {}",
            self.anchor.runtime.id(),
            stack.runtime().id()
        );
        unsafe {
            sys::lua_pushlightuserdata(stack.as_ptr(), self.key() as *mut c_void);
            sys::lua_rawget(stack.as_ptr(), sys::LUA_REGISTRYINDEX);
        }
    }

    /// Replace this handle with a claim on another object.
    ///
    /// The previous claim is released once no other clone shares it.
    pub fn assign(&mut self, other: &Reference) {
        if !Rc::ptr_eq(&self.anchor, &other.anchor) {
            self.anchor = Rc::clone(&other.anchor);
        }
    }

    /// Runtime that owns the object
    #[inline]
    pub fn runtime(&self) -> &Rc<RuntimeState> {
        &self.anchor.runtime
    }

    /// Registry key of the shared anchor
    #[inline]
    pub fn key(&self) -> usize {
        self.anchor.key()
    }

    /// Number of handles sharing this claim
    #[inline]
    pub fn holders(&self) -> usize {
        Rc::strong_count(&self.anchor)
    }

    /// Type of the referenced object at acquisition time
    #[inline]
    pub fn type_tag(&self) -> TypeTag {
        self.anchor.tag
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.anchor.tag.name()
    }

    #[inline]
    pub fn is_table(&self) -> bool {
        self.anchor.tag == TypeTag::Table
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        self.anchor.tag == TypeTag::Function
    }
}

impl PartialEq for Reference {
    /// Identity of the referenced object, not of the handle
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.anchor, &other.anchor) {
            return true;
        }
        if !Rc::ptr_eq(&self.anchor.runtime, &other.anchor.runtime) {
            return false;
        }
        let stack = self.anchor.runtime.stack();
        let _guard = stack.guard();
        if let Err(err) = stack.reserve(2) {
            warn!(event = "reference_compare", error = %err, "no stack room to compare references");
            return false;
        }
        self.push(stack);
        other.push(stack);
        let same = stack.raw_equal(-2, -1);
        stack.pop(2);
        same
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("runtime", &self.anchor.runtime.id())
            .field("type", &self.anchor.tag.name())
            .field("key", &format_args!("{:#x}", self.key()))
            .field("holders", &self.holders())
            .finish()
    }
}
