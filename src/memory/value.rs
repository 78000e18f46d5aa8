//! Managed values exchanged with native memory and native calls

use super::Pointer;
use crate::types::TypeDescriptor;

/// A managed value
///
/// Pointer and struct values are views: `Pointer` aliases the pointee, and
/// `Struct` is a view over the struct's backing bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Pointer(Pointer),
    Struct(Pointer),
}

impl Value {
    /// Null pointer to `pointee`
    pub fn null(pointee: TypeDescriptor) -> Self {
        Self::Pointer(Pointer::null(pointee))
    }

    /// Short name of the variant, for error messages
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::I8(_) => "i8",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Pointer(_) => "pointer",
            Self::Struct(_) => "struct",
        }
    }

    /// Integer payload widened to i64 (unsigned values reinterpret bits)
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(v as i64),
            Self::U8(v) => Some(v as i64),
            Self::I16(v) => Some(v as i64),
            Self::U16(v) => Some(v as i64),
            Self::I32(v) => Some(v as i64),
            Self::U32(v) => Some(v as i64),
            Self::I64(v) => Some(v),
            Self::U64(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(v as f64),
            Self::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&Pointer> {
        match self {
            Self::Pointer(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Pointer> {
        match self {
            Self::Struct(p) => Some(p),
            _ => None,
        }
    }

    /// Whether this value can be stored as `ty` without conversion
    ///
    /// Native `long` slots accept `I64`/`U64` regardless of platform width.
    /// Pointer slots accept any pointer view.
    pub fn fits(&self, ty: &TypeDescriptor) -> bool {
        use crate::types::IntWidth::*;
        match (ty, self) {
            (TypeDescriptor::Void, Self::Void) => true,
            (TypeDescriptor::Int { width: W8, signed: true }, Self::I8(_)) => true,
            (TypeDescriptor::Int { width: W8, signed: false }, Self::U8(_)) => true,
            (TypeDescriptor::Int { width: W16, signed: true }, Self::I16(_)) => true,
            (TypeDescriptor::Int { width: W16, signed: false }, Self::U16(_)) => true,
            (TypeDescriptor::Int { width: W32, signed: true }, Self::I32(_)) => true,
            (TypeDescriptor::Int { width: W32, signed: false }, Self::U32(_)) => true,
            (TypeDescriptor::Int { width: W64 | Long, signed: true }, Self::I64(_)) => true,
            (TypeDescriptor::Int { width: W64 | Long, signed: false }, Self::U64(_)) => true,
            (TypeDescriptor::F32, Self::F32(_)) => true,
            (TypeDescriptor::F64, Self::F64(_)) => true,
            (TypeDescriptor::Pointer(_), Self::Pointer(_)) => true,
            (TypeDescriptor::Struct(layout), Self::Struct(view)) => view
                .element()
                .layout()
                .is_some_and(|l| l.as_ref() == layout.as_ref()),
            _ => false,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Pointer => Pointer,
}

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width primitive that can be read from and written to native memory
///
/// Sealed: implemented for the integer and float primitives only.
pub trait Scalar: Copy + sealed::Sealed + 'static {
    /// Descriptor of the matching C type
    fn descriptor() -> TypeDescriptor;

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;

    /// Reinterpret an address as this type (truncating integers, taking
    /// the low bits for floats)
    fn from_address(address: usize) -> Self;
}

macro_rules! scalar {
    ($($ty:ty => $variant:ident, $desc:expr, |$a:ident| $conv:expr);* $(;)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                #[inline]
                fn descriptor() -> TypeDescriptor {
                    $desc
                }

                #[inline]
                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                #[inline]
                fn from_value(value: &Value) -> Option<Self> {
                    match *value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                #[inline]
                fn from_address($a: usize) -> Self {
                    $conv
                }
            }
        )*
    };
}

scalar! {
    i8 => I8, TypeDescriptor::i8(), |a| a as i8;
    u8 => U8, TypeDescriptor::u8(), |a| a as u8;
    i16 => I16, TypeDescriptor::i16(), |a| a as i16;
    u16 => U16, TypeDescriptor::u16(), |a| a as u16;
    i32 => I32, TypeDescriptor::i32(), |a| a as i32;
    u32 => U32, TypeDescriptor::u32(), |a| a as u32;
    i64 => I64, TypeDescriptor::i64(), |a| a as i64;
    u64 => U64, TypeDescriptor::u64(), |a| a as u64;
    f32 => F32, TypeDescriptor::F32, |a| f32::from_bits(a as u32);
    f64 => F64, TypeDescriptor::F64, |a| f64::from_bits(a as u64);
}
