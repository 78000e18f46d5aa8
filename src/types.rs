//! C type descriptors
//!
//! Describes primitive and aggregate C types with their platform size and
//! alignment. Signedness and width are orthogonal attributes of integers.

use crate::layout::StructLayout;
use core::ffi::{c_long, c_ulong};
use core::fmt;
use core::mem::{align_of, size_of};
use std::sync::Arc;

/// Width of an integer kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
    /// Platform `long` (4 bytes on LLP64 and 32-bit targets, 8 on LP64)
    Long,
}

impl IntWidth {
    /// Size in bytes
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W32 => 4,
            Self::W64 => 8,
            Self::Long => size_of::<c_long>(),
        }
    }

    /// Natural alignment on this platform
    #[inline]
    pub const fn align(self) -> usize {
        match self {
            Self::W8 => align_of::<i8>(),
            Self::W16 => align_of::<i16>(),
            Self::W32 => align_of::<i32>(),
            Self::W64 => align_of::<i64>(),
            Self::Long => align_of::<c_ulong>(),
        }
    }
}

/// Descriptor of a C type as seen by the layout engine and call marshalling
///
/// `Void` is only meaningful as a return type or as the pointee of an opaque
/// pointer. Descriptors compare and hash structurally, which is what keys the
/// call interface cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Void,
    Int { width: IntWidth, signed: bool },
    F32,
    F64,
    Pointer(Arc<TypeDescriptor>),
    Struct(Arc<StructLayout>),
}

impl TypeDescriptor {
    pub const fn i8() -> Self {
        Self::Int { width: IntWidth::W8, signed: true }
    }

    pub const fn u8() -> Self {
        Self::Int { width: IntWidth::W8, signed: false }
    }

    pub const fn i16() -> Self {
        Self::Int { width: IntWidth::W16, signed: true }
    }

    pub const fn u16() -> Self {
        Self::Int { width: IntWidth::W16, signed: false }
    }

    pub const fn i32() -> Self {
        Self::Int { width: IntWidth::W32, signed: true }
    }

    pub const fn u32() -> Self {
        Self::Int { width: IntWidth::W32, signed: false }
    }

    /// Fixed-width `long long`
    pub const fn i64() -> Self {
        Self::Int { width: IntWidth::W64, signed: true }
    }

    pub const fn u64() -> Self {
        Self::Int { width: IntWidth::W64, signed: false }
    }

    /// Native `long`
    pub const fn c_long() -> Self {
        Self::Int { width: IntWidth::Long, signed: true }
    }

    /// Native `unsigned long`
    pub const fn c_ulong() -> Self {
        Self::Int { width: IntWidth::Long, signed: false }
    }

    /// Pointer to `pointee`
    pub fn pointer_to(pointee: TypeDescriptor) -> Self {
        Self::Pointer(Arc::new(pointee))
    }

    /// Opaque `void*`
    pub fn void_ptr() -> Self {
        Self::pointer_to(Self::Void)
    }

    /// Wrap `pointee` in `depth` levels of indirection
    pub fn pointer_with_depth(pointee: TypeDescriptor, depth: usize) -> Self {
        (0..depth).fold(pointee, |inner, _| Self::pointer_to(inner))
    }

    /// By-value struct
    pub fn structure(layout: Arc<StructLayout>) -> Self {
        Self::Struct(layout)
    }

    /// Size in bytes (0 for void)
    pub fn size(&self) -> usize {
        match self {
            Self::Void => 0,
            Self::Int { width, .. } => width.size(),
            Self::F32 => size_of::<f32>(),
            Self::F64 => size_of::<f64>(),
            Self::Pointer(_) => size_of::<usize>(),
            Self::Struct(layout) => layout.size(),
        }
    }

    /// Alignment requirement (1 for void)
    pub fn align(&self) -> usize {
        match self {
            Self::Void => 1,
            Self::Int { width, .. } => width.align(),
            Self::F32 => align_of::<f32>(),
            Self::F64 => align_of::<f64>(),
            Self::Pointer(_) => align_of::<usize>(),
            Self::Struct(layout) => layout.align(),
        }
    }

    /// Distance between consecutive array elements
    pub fn stride(&self) -> usize {
        round_up(self.size(), self.align())
    }

    /// Number of pointer levels (0 for non-pointers)
    pub fn depth(&self) -> usize {
        match self {
            Self::Pointer(pointee) => 1 + pointee.depth(),
            _ => 0,
        }
    }

    /// Pointee of a pointer kind
    pub fn pointee(&self) -> Option<&TypeDescriptor> {
        match self {
            Self::Pointer(pointee) => Some(pointee),
            _ => None,
        }
    }

    /// Struct layout of a struct kind
    pub fn layout(&self) -> Option<&Arc<StructLayout>> {
        match self {
            Self::Struct(layout) => Some(layout),
            _ => None,
        }
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    #[inline]
    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Int { .. })
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    #[inline]
    pub fn is_signed(&self) -> bool {
        match self {
            Self::Int { signed, .. } => *signed,
            Self::F32 | Self::F64 => true,
            _ => false,
        }
    }

    /// Whether the type can be stored by value
    #[inline]
    pub fn is_complete(&self) -> bool {
        !self.is_void()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Int { width, signed } => {
                let name = match (width, signed) {
                    (IntWidth::W8, true) => "int8_t",
                    (IntWidth::W8, false) => "uint8_t",
                    (IntWidth::W16, true) => "int16_t",
                    (IntWidth::W16, false) => "uint16_t",
                    (IntWidth::W32, true) => "int32_t",
                    (IntWidth::W32, false) => "uint32_t",
                    (IntWidth::W64, true) => "int64_t",
                    (IntWidth::W64, false) => "uint64_t",
                    (IntWidth::Long, true) => "long",
                    (IntWidth::Long, false) => "unsigned long",
                };
                f.write_str(name)
            }
            Self::F32 => f.write_str("float"),
            Self::F64 => f.write_str("double"),
            Self::Pointer(pointee) => write!(f, "{}*", pointee),
            Self::Struct(layout) => write!(f, "struct {}", layout.name()),
        }
    }
}

/// Round `value` up to the next multiple of `align` (a power of two)
#[inline(always)]
pub(crate) const fn round_up(value: usize, align: usize) -> usize {
    (value.wrapping_add(align).wrapping_sub(1)) & !align.wrapping_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_sizes() {
        assert_eq!(TypeDescriptor::i8().size(), 1);
        assert_eq!(TypeDescriptor::u16().size(), 2);
        assert_eq!(TypeDescriptor::i32().size(), 4);
        assert_eq!(TypeDescriptor::u64().size(), 8);
        assert_eq!(TypeDescriptor::F32.size(), 4);
        assert_eq!(TypeDescriptor::F64.size(), 8);
        assert_eq!(TypeDescriptor::c_long().size(), size_of::<c_long>());
        assert_eq!(TypeDescriptor::void_ptr().size(), size_of::<usize>());
        assert_eq!(TypeDescriptor::Void.size(), 0);
    }

    #[test]
    fn alignment_matches_platform() {
        assert_eq!(TypeDescriptor::i16().align(), align_of::<i16>());
        assert_eq!(TypeDescriptor::i64().align(), align_of::<i64>());
        assert_eq!(TypeDescriptor::F64.align(), align_of::<f64>());
        assert_eq!(TypeDescriptor::void_ptr().align(), align_of::<*const u8>());
        assert_eq!(TypeDescriptor::Void.align(), 1);
    }

    #[test]
    fn pointer_depth() {
        let ppi = TypeDescriptor::pointer_with_depth(TypeDescriptor::i32(), 2);
        assert_eq!(ppi.depth(), 2);
        assert_eq!(ppi.pointee().map(|p| p.depth()), Some(1));
        assert_eq!(TypeDescriptor::i32().depth(), 0);
        assert_eq!(ppi.to_string(), "int32_t**");
    }

    #[test]
    fn structural_equality() {
        assert_eq!(
            TypeDescriptor::pointer_to(TypeDescriptor::u8()),
            TypeDescriptor::pointer_to(TypeDescriptor::u8())
        );
        assert_ne!(TypeDescriptor::c_long(), TypeDescriptor::i64());
        assert_ne!(TypeDescriptor::i32(), TypeDescriptor::u32());
    }

    #[test]
    fn classification() {
        assert!(TypeDescriptor::i32().is_integral());
        assert!(TypeDescriptor::F64.is_float());
        assert!(!TypeDescriptor::Void.is_integral());
        assert!(!TypeDescriptor::void_ptr().is_float());
        assert!(!TypeDescriptor::Void.is_complete());
        assert!(!TypeDescriptor::u32().is_signed());
    }

    #[test]
    fn round_up_powers_of_two() {
        assert_eq!(round_up(0, 8), 0);
        assert_eq!(round_up(1, 8), 8);
        assert_eq!(round_up(8, 8), 8);
        assert_eq!(round_up(9, 4), 12);
    }
}
