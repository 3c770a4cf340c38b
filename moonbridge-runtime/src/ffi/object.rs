//! Table views - keyed access to runtime-owned tables
//!
//! A `Table` carries no state beyond its `Reference`. Every operation pushes
//! the table, does its work and pops everything it pushed. Keyed get/set go
//! through small native trampolines run under `lua_pcall`, so a failing
//! metamethod (or a nil key) is reported through the protector instead of
//! unwinding past the host.

use std::ffi::c_int;
use std::fmt;

use super::refcount::Reference;
use crate::error::{Error, Result};
use crate::ffi::sys;
use crate::interop::{marshal, Stack, TypeTag, Variant};
use crate::logging::{trace, warn};
use crate::state::RuntimeState;

/// `(table, key) -> table[key]`
unsafe extern "C-unwind" fn get_field(l: *mut sys::lua_State) -> c_int {
    sys::lua_gettable(l, 1);
    1
}

/// `(table, key, value) -> ()`, assigns `table[key] = value`
unsafe extern "C-unwind" fn set_field(l: *mut sys::lua_State) -> c_int {
    sys::lua_settable(l, 1);
    0
}

/// Push `target[key]` under protection.
///
/// `push_target` must push exactly one value. Returns `Ok(true)` with the
/// result on top of the stack, or `Ok(false)` with nothing pushed when the
/// failure was absorbed by the error handler.
pub fn push_field(stack: Stack<'_>, push_target: impl FnOnce(Stack<'_>), key: &Variant) -> Result<bool> {
    stack.reserve(3)?;
    stack.push_function(get_field);
    push_target(stack);
    marshal::push(stack, key);
    let status = unsafe { sys::lua_pcall(stack.as_ptr(), 2, 1, 0) };
    stack.runtime().check(status)
}

/// Assign `target[key] = value` under protection
pub fn store_field(
    stack: Stack<'_>,
    push_target: impl FnOnce(Stack<'_>),
    key: &Variant,
    value: &Variant,
) -> Result<()> {
    stack.reserve(4)?;
    stack.push_function(set_field);
    push_target(stack);
    marshal::push(stack, key);
    marshal::push(stack, value);
    let status = unsafe { sys::lua_pcall(stack.as_ptr(), 3, 0, 0) };
    stack.runtime().protect(status)
}

/// Keyed read/write view over a runtime table
#[derive(Clone, PartialEq)]
pub struct Table {
    reference: Reference,
}

impl Table {
    /// Allocate a fresh, empty table
    pub fn new(stack: Stack<'_>) -> Result<Self> {
        let _guard = stack.guard();
        stack.reserve(1)?;
        stack.new_table();
        let reference = Reference::acquire(stack, -1);
        stack.pop(1);
        Ok(Self {
            reference: reference?,
        })
    }

    /// View an existing reference as a table
    pub fn from_reference(reference: Reference) -> Result<Self> {
        if reference.type_tag() != TypeTag::Table {
            return Err(Error::Marshal {
                expected: "table",
                found: reference.type_tag().name(),
            });
        }
        Ok(Self { reference })
    }

    #[inline]
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    #[inline]
    pub fn into_reference(self) -> Reference {
        self.reference
    }

    #[inline]
    fn runtime(&self) -> &std::rc::Rc<RuntimeState> {
        self.reference.runtime()
    }

    /// `table[key]`, honoring metamethods.
    ///
    /// A runtime failure absorbed by the error handler reads as Nil.
    pub fn get(&self, key: impl Into<Variant>) -> Result<Variant> {
        let key = key.into();
        let runtime = self.runtime();
        let stack = runtime.stack();
        let _guard = stack.guard();

        if !push_field(stack, |s| self.reference.push(s), &key)? {
            return Ok(Variant::Nil);
        }
        trace!(event = "table_get", key = %key);
        marshal::pop_with(stack, runtime.marshal_mode())
    }

    /// `table[key] = value`, honoring metamethods
    pub fn set(&self, key: impl Into<Variant>, value: impl Into<Variant>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        let stack = self.runtime().stack();
        let _guard = stack.guard();

        trace!(event = "table_set", key = %key);
        store_field(stack, |s| self.reference.push(s), &key, &value)
    }

    /// Proxy for one key, for `table.entry("k").set(..)` style access
    pub fn entry(&self, key: impl Into<Variant>) -> TableEntry<'_> {
        TableEntry {
            table: self,
            key: key.into(),
        }
    }

    /// Raw length (the border of the sequence part, no `__len`)
    pub fn len(&self) -> usize {
        let stack = self.runtime().stack();
        let _guard = stack.guard();
        if let Err(err) = stack.reserve(1) {
            warn!(event = "table_len", error = %err, "no stack room to read table length");
            return 0;
        }
        self.reference.push(stack);
        let len = unsafe { sys::lua_rawlen(stack.as_ptr(), -1) };
        stack.pop(1);
        len
    }

    /// True when the table has no entries at all, array or hash part.
    ///
    /// Looks at the first raw key only, so nothing is marshalled.
    pub fn is_empty(&self) -> bool {
        let stack = self.runtime().stack();
        let _guard = stack.guard();
        if let Err(err) = stack.reserve(3) {
            warn!(event = "table_is_empty", error = %err, "no stack room to inspect table");
            return true;
        }
        self.reference.push(stack);
        stack.push_nil();
        let empty = unsafe { sys::lua_next(stack.as_ptr(), -2) } == 0;
        // lua_next pushed a key and value, or consumed the nil key
        stack.pop(if empty { 1 } else { 3 });
        empty
    }

    /// Snapshot of every key/value pair, in the runtime's traversal order.
    ///
    /// Traversal is raw; `__pairs` is not consulted.
    pub fn pairs(&self) -> Result<Vec<(Variant, Variant)>> {
        let runtime = self.runtime();
        let stack = runtime.stack();
        let base = stack.top();
        stack.reserve(3)?;

        self.reference.push(stack);
        stack.push_nil();

        let mode = runtime.marshal_mode();
        let mut entries = Vec::new();
        while unsafe { sys::lua_next(stack.as_ptr(), -2) } != 0 {
            // The key stays in place for the next step, so it must not be
            // converted in place; peek only reads strings that already are.
            let entry = marshal::peek_with(stack, -2, mode)
                .and_then(|key| marshal::pop_with(stack, mode).map(|value| (key, value)));
            match entry {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    stack.set_top(base);
                    return Err(err);
                }
            }
        }
        stack.pop(1);
        debug_assert_eq!(stack.top(), base);
        Ok(entries)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("reference", &self.reference)
            .finish()
    }
}

/// One key of a table
#[derive(Debug, Clone)]
pub struct TableEntry<'t> {
    table: &'t Table,
    key: Variant,
}

impl TableEntry<'_> {
    #[inline]
    pub fn key(&self) -> &Variant {
        &self.key
    }

    pub fn get(&self) -> Result<Variant> {
        self.table.get(self.key.clone())
    }

    pub fn set(&self, value: impl Into<Variant>) -> Result<()> {
        self.table.set(self.key.clone(), value)
    }
}
