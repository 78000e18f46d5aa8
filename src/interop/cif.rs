//! Call interface builder
//!
//! Maps a function's parameter and return descriptors onto a prepared
//! libffi call interface. Interfaces carry no function identity and are
//! cached process-wide by structural signature.

use super::abi::{classify_params, ArgShape, CallingConvention};
use super::counters;
use crate::logging::log_interface_built;
use crate::types::{IntWidth, TypeDescriptor};
use dashmap::DashMap;
use libffi::middle::{Cif, Type};
use libffi::raw::ffi_cif;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Ordered parameter descriptors plus the return descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    params: Vec<TypeDescriptor>,
    ret: TypeDescriptor,
}

impl Signature {
    pub fn new(params: Vec<TypeDescriptor>, ret: TypeDescriptor) -> Self {
        Self { params, ret }
    }

    #[inline]
    pub fn params(&self) -> &[TypeDescriptor] {
        &self.params
    }

    #[inline]
    pub fn ret(&self) -> &TypeDescriptor {
        &self.ret
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// Prepared libffi descriptor
///
/// The `Cif` is never mutated after preparation; libffi only reads it during
/// calls and closure dispatch.
struct PreparedCif(Cif);

unsafe impl Send for PreparedCif {}
unsafe impl Sync for PreparedCif {}

/// Immutable, reusable call interface
pub struct CallInterface {
    signature: Signature,
    shapes: Vec<ArgShape>,
    cif: PreparedCif,
}

static INTERFACES: Lazy<DashMap<Signature, Arc<CallInterface>>> = Lazy::new(DashMap::new);

impl CallInterface {
    /// Build, or fetch from cache, the interface for `params -> ret`
    ///
    /// # Panics
    /// A `void` parameter or a by-value struct without fields (at any
    /// nesting depth) is a malformed descriptor and panics.
    pub fn build(params: Vec<TypeDescriptor>, ret: TypeDescriptor) -> Arc<CallInterface> {
        let signature = Signature::new(params, ret);
        if let Some(cached) = INTERFACES.get(&signature) {
            return cached.value().clone();
        }

        let interface = Arc::new(Self::prepare(signature.clone()));
        INTERFACES
            .entry(signature)
            .or_insert_with(|| interface)
            .value()
            .clone()
    }

    fn prepare(signature: Signature) -> Self {
        for (index, param) in signature.params.iter().enumerate() {
            assert!(
                !param.is_void(),
                "parameter {} of {} is void",
                index,
                signature
            );
        }

        let args: Vec<Type> = signature.params.iter().map(ffi_type).collect();
        let cif = Cif::new(args, ffi_type(&signature.ret));
        let shapes = classify_params(CallingConvention::platform(), &signature.params);

        counters::INTERFACES_BUILT.fetch_add(1, Ordering::Relaxed);
        log_interface_built(&signature.to_string(), signature.params.len());

        Self {
            signature,
            shapes,
            cif: PreparedCif(cif),
        }
    }

    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    #[inline]
    pub fn params(&self) -> &[TypeDescriptor] {
        self.signature.params()
    }

    #[inline]
    pub fn ret(&self) -> &TypeDescriptor {
        self.signature.ret()
    }

    #[inline]
    pub fn arg_count(&self) -> usize {
        self.signature.params.len()
    }

    /// ABI shape of each parameter
    #[inline]
    pub fn shapes(&self) -> &[ArgShape] {
        &self.shapes
    }

    #[inline]
    pub(crate) fn raw(&self) -> *mut ffi_cif {
        self.cif.0.as_raw_ptr()
    }
}

impl fmt::Debug for CallInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallInterface")
            .field("signature", &format_args!("{}", self.signature))
            .field("shapes", &self.shapes)
            .finish()
    }
}

/// Number of cached interfaces
pub fn cached_interfaces() -> usize {
    INTERFACES.len()
}

/// libffi type for a descriptor
///
/// By-value structs become composite types built from their fields, with
/// array fields expanded element by element.
fn ffi_type(ty: &TypeDescriptor) -> Type {
    match ty {
        TypeDescriptor::Void => Type::void(),
        TypeDescriptor::Int { width, signed } => match (width, signed) {
            (IntWidth::W8, true) => Type::i8(),
            (IntWidth::W8, false) => Type::u8(),
            (IntWidth::W16, true) => Type::i16(),
            (IntWidth::W16, false) => Type::u16(),
            (IntWidth::W32, true) => Type::i32(),
            (IntWidth::W32, false) => Type::u32(),
            (IntWidth::W64, true) => Type::i64(),
            (IntWidth::W64, false) => Type::u64(),
            (IntWidth::Long, true) => Type::c_long(),
            (IntWidth::Long, false) => Type::c_ulong(),
        },
        TypeDescriptor::F32 => Type::f32(),
        TypeDescriptor::F64 => Type::f64(),
        TypeDescriptor::Pointer(_) => Type::pointer(),
        TypeDescriptor::Struct(layout) => {
            assert!(
                !layout.is_empty(),
                "struct {} has no fields and cannot be passed by value",
                layout.name()
            );
            let mut members = Vec::new();
            for field in layout.fields() {
                let member = ffi_type(field.ty());
                members.extend(core::iter::repeat(member).take(field.cardinality()));
            }
            Type::structure(members)
        }
    }
}
