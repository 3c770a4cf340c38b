//! Variant - the closed set of values that cross the boundary
//!
//! Exactly one payload is active at a time. Equality compares the kind
//! first and the payload second; `Nil` equals only `Nil`.

use std::borrow::Cow;
use std::fmt;

use crate::ffi::{Reference, Table};

/// Kind tag of a Variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Integer,
    Float,
    String,
    Boolean,
    Reference,
    Nil,
}

impl Kind {
    /// Runtime-facing name, used in error messages
    pub const fn name(self) -> &'static str {
        match self {
            Self::Integer | Self::Float => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Reference => "reference",
            Self::Nil => "nil",
        }
    }

    #[inline]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

/// Host-side tagged value
#[derive(Debug, Clone, Default)]
pub enum Variant {
    Integer(i64),
    Float(f64),
    /// Borrowed for literals, owned for anything read back from the stack
    String(Cow<'static, str>),
    Boolean(bool),
    /// Strong claim on a runtime-owned object
    Reference(Reference),
    #[default]
    Nil,
}

impl Variant {
    #[inline]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Integer(_) => Kind::Integer,
            Self::Float(_) => Kind::Float,
            Self::String(_) => Kind::String,
            Self::Boolean(_) => Kind::Boolean,
            Self::Reference(_) => Kind::Reference,
            Self::Nil => Kind::Nil,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Numeric payload of either numeric kind
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Integer(i) => Some(i as f64),
            Self::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Integral payload; floats qualify only when they hold a whole number
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Integer(i) => Some(i),
            Self::Float(f) if f.fract() == 0.0 => num_traits::cast::<f64, i64>(f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Promote a Reference payload to a table view, if it points at a table
    pub fn to_table(&self) -> Option<Table> {
        self.as_reference().and_then(|r| Table::from_reference(r.clone()).ok())
    }

    /// Value equality across numeric subtypes.
    ///
    /// The runtime has a single numeric representation, so an Integer that
    /// went across and came back as a Float is the same value.
    pub fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.kind().is_numeric() && b.kind().is_numeric() => a.as_f64() == b.as_f64(),
            (a, b) => a == b,
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Reference(a), Self::Reference(b)) => a == b,
            (Self::Nil, Self::Nil) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(n) => write!(f, "{}", n),
            Self::String(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Reference(_) => f.write_str("reference"),
            Self::Nil => f.write_str("nil"),
        }
    }
}

macro_rules! variant_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Variant {
                #[inline]
                fn from(value: $t) -> Self {
                    Self::Integer(i64::from(value))
                }
            }
        )*
    };
}

variant_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Variant {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Variant {
    #[inline]
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<bool> for Variant {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&'static str> for Variant {
    #[inline]
    fn from(value: &'static str) -> Self {
        Self::String(Cow::Borrowed(value))
    }
}

impl From<String> for Variant {
    #[inline]
    fn from(value: String) -> Self {
        Self::String(Cow::Owned(value))
    }
}

impl From<Cow<'static, str>> for Variant {
    #[inline]
    fn from(value: Cow<'static, str>) -> Self {
        Self::String(value)
    }
}

impl From<Reference> for Variant {
    #[inline]
    fn from(value: Reference) -> Self {
        Self::Reference(value)
    }
}

impl From<Table> for Variant {
    #[inline]
    fn from(value: Table) -> Self {
        Self::Reference(value.into_reference())
    }
}

impl From<()> for Variant {
    #[inline]
    fn from(_: ()) -> Self {
        Self::Nil
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    #[inline]
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Nil, Into::into)
    }
}
