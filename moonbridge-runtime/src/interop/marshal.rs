//! Type marshaling - Variant ↔ stack conversions
//!
//! Design: every push grows the stack by exactly one slot; every pop removes
//! exactly one slot, even when the value cannot be classified.

use std::borrow::Cow;
use std::ffi::c_int;

use super::abi::{Stack, TypeTag};
use super::types::Variant;
use crate::error::{Error, Result};
use crate::ffi::Reference;
use crate::logging::trace;

/// How values outside the Variant set are treated when read back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarshalMode {
    /// Degrade to Nil
    #[default]
    Lossy,
    /// Report a marshal error
    Strict,
    /// Acquire a Reference to the object
    Promote,
}

impl MarshalMode {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lossy => "lossy",
            Self::Strict => "strict",
            Self::Promote => "promote",
        }
    }
}

/// Push a Variant onto the stack.
///
/// Both numeric kinds funnel through the runtime's floating-point
/// representation.
pub fn push(stack: Stack<'_>, value: &Variant) {
    match value {
        Variant::Integer(i) => stack.push_number(*i as f64),
        Variant::Float(f) => stack.push_number(*f),
        Variant::String(s) => stack.push_str(s),
        Variant::Boolean(b) => stack.push_bool(*b),
        Variant::Reference(r) => r.push(stack),
        Variant::Nil => stack.push_nil(),
    }
}

/// Classify the value at `index` without removing it (lossy)
#[inline]
pub fn peek(stack: Stack<'_>, index: c_int) -> Variant {
    peek_scalar(stack, index).unwrap_or(Variant::Nil)
}

/// Remove the top slot and return its classification (lossy)
pub fn pop(stack: Stack<'_>) -> Variant {
    let value = peek(stack, -1);
    stack.pop(1);
    value
}

/// Classify the value at `index` under an explicit marshal mode
pub fn peek_with(stack: Stack<'_>, index: c_int, mode: MarshalMode) -> Result<Variant> {
    if let Some(value) = peek_scalar(stack, index) {
        return Ok(value);
    }

    let tag = stack.type_of(index);
    match mode {
        MarshalMode::Lossy => {
            trace!(event = "marshal_degrade", found = tag.name(), "value degraded to nil");
            Ok(Variant::Nil)
        }
        MarshalMode::Strict => Err(Error::Marshal {
            expected: "nil, number, string or boolean",
            found: tag.name(),
        }),
        MarshalMode::Promote => Reference::acquire(stack, index).map(Variant::Reference),
    }
}

/// Remove the top slot and classify it under `mode`.
///
/// The slot is removed even when classification fails.
pub fn pop_with(stack: Stack<'_>, mode: MarshalMode) -> Result<Variant> {
    let value = peek_with(stack, -1, mode);
    stack.pop(1);
    value
}

/// Scalar kinds the runtime can hand back directly
fn peek_scalar(stack: Stack<'_>, index: c_int) -> Option<Variant> {
    match stack.type_of(index) {
        TypeTag::Number => stack.to_number(index).map(Variant::Float),
        TypeTag::Boolean => Some(Variant::Boolean(stack.to_bool(index))),
        // Already a string, so `lua_tolstring` does not rewrite the slot.
        TypeTag::String => stack
            .to_string_lossy(index)
            .map(|s| Variant::String(Cow::Owned(s))),
        TypeTag::Nil | TypeTag::None => Some(Variant::Nil),
        _ => None,
    }
}
