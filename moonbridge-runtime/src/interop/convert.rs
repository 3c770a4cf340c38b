//! Conversions between stack slots and host parameter/return types.
//!
//! `FromStack` extracts one typed parameter, `ToStack` pushes a host result
//! and reports how many slots it produced. `Params` assembles a whole
//! parameter list, popping from the top, so the last declared parameter is
//! extracted first.

use std::borrow::Cow;
use std::ffi::c_int;
use std::fmt::Display;

use super::abi::{Stack, TypeTag};
use super::marshal;
use super::types::Variant;
use crate::error::{Error, Result};
use crate::ffi::{Reference, Table};

/// Why one slot could not be converted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: &'static str,
    pub found: &'static str,
}

impl Mismatch {
    #[inline]
    pub fn at(stack: Stack<'_>, index: c_int, expected: &'static str) -> Self {
        Self {
            expected,
            found: stack.type_of(index).name(),
        }
    }
}

/// A parameter that failed to convert, with its 1-based position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgMismatch {
    pub position: usize,
    pub expected: &'static str,
    pub found: &'static str,
}

/// Host types that can be read from a stack slot
pub trait FromStack: Sized {
    /// Runtime type name used when conversion fails
    const EXPECTED: &'static str;

    /// Read the value at `index` without removing it
    fn from_stack(stack: Stack<'_>, index: c_int) -> Result<Self, Mismatch>;
}

/// Host types that can be pushed as results
pub trait ToStack {
    /// Push the value, returning the number of slots pushed
    fn to_stack(self, stack: Stack<'_>) -> Result<c_int>;
}

/// Read the top slot as `T` and remove it.
///
/// Arguments of a native call fill the frame from slot 1, so the top index
/// is also the declared position of the parameter being extracted.
pub fn pop_param<T: FromStack>(stack: Stack<'_>) -> Result<T, ArgMismatch> {
    let position = usize::try_from(stack.top()).unwrap_or(0);
    let value = T::from_stack(stack, -1).map_err(|m| ArgMismatch {
        position,
        expected: m.expected,
        found: m.found,
    });
    stack.pop(1);
    value
}

// ============================================================================
// FromStack
// ============================================================================

impl FromStack for f64 {
    const EXPECTED: &'static str = "number";

    fn from_stack(stack: Stack<'_>, index: c_int) -> Result<Self, Mismatch> {
        stack
            .to_number(index)
            .ok_or_else(|| Mismatch::at(stack, index, Self::EXPECTED))
    }
}

impl FromStack for f32 {
    const EXPECTED: &'static str = "number";

    fn from_stack(stack: Stack<'_>, index: c_int) -> Result<Self, Mismatch> {
        f64::from_stack(stack, index).map(|n| n as f32)
    }
}

macro_rules! integer_from_stack {
    ($($t:ty),*) => {
        $(
            impl FromStack for $t {
                const EXPECTED: &'static str = "integer";

                fn from_stack(stack: Stack<'_>, index: c_int) -> Result<Self, Mismatch> {
                    stack
                        .to_number(index)
                        .filter(|n| n.fract() == 0.0)
                        .and_then(num_traits::cast::<f64, $t>)
                        .ok_or_else(|| Mismatch::at(stack, index, Self::EXPECTED))
                }
            }
        )*
    };
}

integer_from_stack!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromStack for bool {
    const EXPECTED: &'static str = "boolean";

    /// Runtime truthiness: only nil and false are false
    fn from_stack(stack: Stack<'_>, index: c_int) -> Result<Self, Mismatch> {
        Ok(stack.to_bool(index))
    }
}

impl FromStack for String {
    const EXPECTED: &'static str = "string";

    fn from_stack(stack: Stack<'_>, index: c_int) -> Result<Self, Mismatch> {
        match stack.type_of(index) {
            TypeTag::String | TypeTag::Number => stack
                .to_string_lossy(index)
                .ok_or_else(|| Mismatch::at(stack, index, Self::EXPECTED)),
            _ => Err(Mismatch::at(stack, index, Self::EXPECTED)),
        }
    }
}

impl FromStack for Variant {
    const EXPECTED: &'static str = "value";

    fn from_stack(stack: Stack<'_>, index: c_int) -> Result<Self, Mismatch> {
        marshal::peek_with(stack, index, stack.runtime().marshal_mode()).map_err(|err| match err {
            Error::Marshal { expected, found } => Mismatch { expected, found },
            _ => Mismatch::at(stack, index, Self::EXPECTED),
        })
    }
}

impl FromStack for Reference {
    const EXPECTED: &'static str = "value";

    fn from_stack(stack: Stack<'_>, index: c_int) -> Result<Self, Mismatch> {
        Reference::acquire(stack, index).map_err(|_| Mismatch::at(stack, index, Self::EXPECTED))
    }
}

impl FromStack for Table {
    const EXPECTED: &'static str = "table";

    fn from_stack(stack: Stack<'_>, index: c_int) -> Result<Self, Mismatch> {
        if stack.type_of(index) != TypeTag::Table {
            return Err(Mismatch::at(stack, index, Self::EXPECTED));
        }
        Reference::acquire(stack, index)
            .and_then(Table::from_reference)
            .map_err(|_| Mismatch::at(stack, index, Self::EXPECTED))
    }
}

impl<T: FromStack> FromStack for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_stack(stack: Stack<'_>, index: c_int) -> Result<Self, Mismatch> {
        if stack.type_of(index).is_nil_or_none() {
            Ok(None)
        } else {
            T::from_stack(stack, index).map(Some)
        }
    }
}

// ============================================================================
// ToStack
// ============================================================================

impl ToStack for () {
    #[inline]
    fn to_stack(self, _stack: Stack<'_>) -> Result<c_int> {
        Ok(0)
    }
}

macro_rules! number_to_stack {
    ($($t:ty),*) => {
        $(
            impl ToStack for $t {
                #[inline]
                fn to_stack(self, stack: Stack<'_>) -> Result<c_int> {
                    stack.push_number(self as f64);
                    Ok(1)
                }
            }
        )*
    };
}

number_to_stack!(f32, f64, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl ToStack for bool {
    #[inline]
    fn to_stack(self, stack: Stack<'_>) -> Result<c_int> {
        stack.push_bool(self);
        Ok(1)
    }
}

impl ToStack for &str {
    #[inline]
    fn to_stack(self, stack: Stack<'_>) -> Result<c_int> {
        stack.push_str(self);
        Ok(1)
    }
}

impl ToStack for String {
    #[inline]
    fn to_stack(self, stack: Stack<'_>) -> Result<c_int> {
        stack.push_str(&self);
        Ok(1)
    }
}

impl ToStack for Cow<'_, str> {
    #[inline]
    fn to_stack(self, stack: Stack<'_>) -> Result<c_int> {
        stack.push_str(&self);
        Ok(1)
    }
}

impl ToStack for Variant {
    #[inline]
    fn to_stack(self, stack: Stack<'_>) -> Result<c_int> {
        marshal::push(stack, &self);
        Ok(1)
    }
}

impl ToStack for Reference {
    #[inline]
    fn to_stack(self, stack: Stack<'_>) -> Result<c_int> {
        self.push(stack);
        Ok(1)
    }
}

impl ToStack for Table {
    #[inline]
    fn to_stack(self, stack: Stack<'_>) -> Result<c_int> {
        self.reference().push(stack);
        Ok(1)
    }
}

impl<T: ToStack> ToStack for Option<T> {
    fn to_stack(self, stack: Stack<'_>) -> Result<c_int> {
        match self {
            Some(value) => value.to_stack(stack),
            None => {
                stack.push_nil();
                Ok(1)
            }
        }
    }
}

impl<T: ToStack, E: Display> ToStack for Result<T, E> {
    /// `Err` becomes a runtime error raised at the call site
    fn to_stack(self, stack: Stack<'_>) -> Result<c_int> {
        match self {
            Ok(value) => value.to_stack(stack),
            Err(err) => Err(Error::Callback(err.to_string())),
        }
    }
}

// ============================================================================
// Parameter lists and call arguments
// ============================================================================

/// A complete, fixed-arity parameter list
pub trait Params: Sized + 'static {
    const ARITY: usize;

    /// Pop exactly `ARITY` slots, last parameter first
    fn extract(stack: Stack<'_>) -> Result<Self, ArgMismatch>;
}

/// Host callables with a statically known signature
pub trait HostFunction<P, R>: 'static {
    fn call_with(&self, params: P) -> R;
}

/// Arguments supplied by the host when calling into the runtime
pub trait IntoArgs {
    fn into_args(self) -> Vec<Variant>;
}

impl IntoArgs for Vec<Variant> {
    #[inline]
    fn into_args(self) -> Vec<Variant> {
        self
    }
}

impl IntoArgs for &[Variant] {
    #[inline]
    fn into_args(self) -> Vec<Variant> {
        self.to_vec()
    }
}

macro_rules! count_idents {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count_idents!($($tail)*) };
}

// Expands to `let` bindings that pop the listed parameters in reverse order.
macro_rules! pop_reversed {
    ($stack:ident; []; $($rev:ident : $RT:ident),*) => {
        $( let $rev = pop_param::<$RT>($stack)?; )*
    };
    ($stack:ident; [$head:ident : $HT:ident $(, $tail:ident : $TT:ident)*]; $($rev:ident : $RT:ident),*) => {
        pop_reversed!($stack; [$($tail : $TT),*]; $head : $HT $(, $rev : $RT)*)
    };
}

macro_rules! impl_signature {
    ($($name:ident : $T:ident),*) => {
        impl<$($T: FromStack + 'static),*> Params for ($($T,)*) {
            const ARITY: usize = count_idents!($($T)*);

            #[allow(unused_variables)]
            fn extract(stack: Stack<'_>) -> Result<Self, ArgMismatch> {
                pop_reversed!(stack; [$($name : $T),*]; );
                Ok(($($name,)*))
            }
        }

        impl<Func, Ret, $($T),*> HostFunction<($($T,)*), Ret> for Func
        where
            Func: Fn($($T),*) -> Ret + 'static,
        {
            #[inline]
            fn call_with(&self, ($($name,)*): ($($T,)*)) -> Ret {
                self($($name),*)
            }
        }

        impl<$($T: Into<Variant>),*> IntoArgs for ($($T,)*) {
            #[inline]
            fn into_args(self) -> Vec<Variant> {
                let ($($name,)*) = self;
                vec![$($name.into()),*]
            }
        }
    };
}

impl_signature!();
impl_signature!(a: A);
impl_signature!(a: A, b: B);
impl_signature!(a: A, b: B, c: C);
impl_signature!(a: A, b: B, c: C, d: D);
impl_signature!(a: A, b: B, c: C, d: D, e: E);
impl_signature!(a: A, b: B, c: C, d: D, e: E, f: F);
impl_signature!(a: A, b: B, c: C, d: D, e: E, f: F, g: G);
impl_signature!(a: A, b: B, c: C, d: D, e: E, f: F, g: G, h: H);
