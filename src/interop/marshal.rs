//! Type marshaling between managed values and libffi argument storage
//!
//! Design: Scalars and pointers are written into register-width slots kept
//! inline for short argument lists. By-value structs are passed by the
//! address of their backing bytes without copying.

use crate::error::{AllocError, InvocationError};
use crate::memory::{Pointer, Value};
use crate::types::{IntWidth, TypeDescriptor};
use core::ffi::{c_long, c_ulong, c_void};
use core::mem::size_of;
use core::ptr;
use libffi::raw::ffi_arg;
use smallvec::SmallVec;

/// Argument slots for one native call
///
/// Slot addresses are handed to libffi, so pointers are taken with
/// [`ArgFrame::pointers`] only once the frame is in its final place.
pub(crate) struct ArgFrame {
    slots: SmallVec<[u64; 8]>,
    /// Backing address for by-value struct arguments
    structs: SmallVec<[Option<usize>; 8]>,
}

impl ArgFrame {
    /// Check `args` against `params` and fill the slots
    pub fn marshal(params: &[TypeDescriptor], args: &[Value]) -> Result<Self, InvocationError> {
        if params.len() != args.len() {
            return Err(InvocationError::ArgCountMismatch {
                expected: params.len(),
                got: args.len(),
            });
        }

        let mut frame = Self {
            slots: SmallVec::from_elem(0, args.len()),
            structs: SmallVec::from_elem(None, args.len()),
        };

        for (index, (ty, value)) in params.iter().zip(args).enumerate() {
            if !value.fits(ty) {
                return Err(InvocationError::ArgumentType {
                    index,
                    expected: ty.to_string(),
                    found: value.kind_name(),
                });
            }

            if let Value::Struct(view) = value {
                frame.structs[index] = Some(view.address());
                continue;
            }

            let slot = &mut frame.slots[index] as *mut u64 as usize;
            // A fitting scalar or pointer always writes; the slot is 8 bytes.
            unsafe {
                Pointer::wrap(slot, ty.clone())
                    .write(value)
                    .map_err(|_| InvocationError::ArgumentType {
                        index,
                        expected: ty.to_string(),
                        found: value.kind_name(),
                    })?;
            }
        }

        Ok(frame)
    }

    /// libffi `avalue` array pointing into this frame
    pub fn pointers(&mut self) -> SmallVec<[*mut c_void; 8]> {
        let base = self.slots.as_mut_ptr();
        self.structs
            .iter()
            .enumerate()
            .map(|(i, address)| match address {
                Some(address) => *address as *mut c_void,
                None => unsafe { base.add(i) as *mut c_void },
            })
            .collect()
    }
}

/// Storage large enough for any non-struct return value
#[repr(C, align(16))]
pub(crate) struct ReturnSlot([u8; 16]);

impl ReturnSlot {
    pub fn new() -> Self {
        Self([0; 16])
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.0.as_mut_ptr() as *mut c_void
    }
}

/// Read a non-struct return value from libffi result storage
///
/// Integers narrower than a register come back widened to `ffi_arg` and are
/// truncated here.
///
/// # Safety
/// `storage` must hold a value of type `ty` as written by `ffi_call`.
pub(crate) unsafe fn read_return(storage: *const c_void, ty: &TypeDescriptor) -> Value {
    let widened = || ptr::read_unaligned(storage as *const ffi_arg);
    match ty {
        TypeDescriptor::Void => Value::Void,
        TypeDescriptor::Int { width, signed } => match (width, signed) {
            (IntWidth::W8, true) => Value::I8(widened() as i8),
            (IntWidth::W8, false) => Value::U8(widened() as u8),
            (IntWidth::W16, true) => Value::I16(widened() as i16),
            (IntWidth::W16, false) => Value::U16(widened() as u16),
            (IntWidth::W32, true) => Value::I32(widened() as i32),
            (IntWidth::W32, false) => Value::U32(widened() as u32),
            (IntWidth::W64, true) => Value::I64(ptr::read_unaligned(storage as *const i64)),
            (IntWidth::W64, false) => Value::U64(ptr::read_unaligned(storage as *const u64)),
            (IntWidth::Long, true) => Value::I64(widened() as c_long as i64),
            (IntWidth::Long, false) => Value::U64(widened() as c_ulong as u64),
        },
        TypeDescriptor::F32 => Value::F32(ptr::read_unaligned(storage as *const f32)),
        TypeDescriptor::F64 => Value::F64(ptr::read_unaligned(storage as *const f64)),
        TypeDescriptor::Pointer(pointee) => Value::Pointer(Pointer::wrap(
            ptr::read_unaligned(storage as *const usize),
            (**pointee).clone(),
        )),
        TypeDescriptor::Struct(_) => unreachable!("struct returns are staged in a buffer"),
    }
}

/// Read one incoming callback argument
///
/// By-value structs are copied into a fresh buffer-backed struct so the
/// managed function may keep them past the callback.
///
/// # Safety
/// `arg` must point to a value of type `ty`.
pub(crate) unsafe fn read_argument(arg: *const c_void, ty: &TypeDescriptor) -> Result<Value, AllocError> {
    match ty {
        TypeDescriptor::Struct(layout) => {
            let copy = Pointer::new_struct(layout.clone())?;
            ptr::copy_nonoverlapping(arg as *const u8, copy.as_ptr::<u8>(), layout.size());
            Ok(Value::Struct(copy))
        }
        _ => Ok(Pointer::wrap(arg as usize, ty.clone()).read()),
    }
}

/// Write a callback result into the native return slot
///
/// Integers narrower than a register are extended to `ffi_arg` width.
/// Returns `false`, leaving a zeroed slot, when `value` does not fit `ty`.
///
/// # Safety
/// `result` must point to libffi return storage for `ty`.
pub(crate) unsafe fn write_return(result: *mut c_void, ty: &TypeDescriptor, value: &Value) -> bool {
    if ty.is_void() {
        return true;
    }

    if !value.fits(ty) {
        let width = match ty {
            TypeDescriptor::Struct(layout) => layout.size(),
            _ => ty.size().max(size_of::<ffi_arg>()),
        };
        ptr::write_bytes(result as *mut u8, 0, width);
        return false;
    }

    match (ty, value.as_i64()) {
        (TypeDescriptor::Int { .. }, Some(v)) if ty.size() <= size_of::<ffi_arg>() => {
            // `as_i64` sign-extends signed and zero-extends unsigned kinds.
            ptr::write_unaligned(result as *mut ffi_arg, v as ffi_arg);
            true
        }
        _ => Pointer::wrap(result as usize, ty.clone()).write(value).is_ok(),
    }
}
