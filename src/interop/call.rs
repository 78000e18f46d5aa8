//! Native call dispatch through a prepared call interface

use super::cif::CallInterface;
use super::counters;
use super::marshal::{read_return, ArgFrame, ReturnSlot};
use crate::error::InvocationError;
use crate::logging::{log_ffi_call, log_ffi_return};
use crate::memory::{Pointer, Value};
use crate::types::TypeDescriptor;
use core::ffi::c_void;
use libffi::middle::CodePtr;
use libffi::raw::ffi_call;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Native function address paired with its call interface
#[derive(Debug, Clone)]
pub struct FunctionCall {
    address: usize,
    interface: Arc<CallInterface>,
}

impl FunctionCall {
    /// Fails fast on a null address
    pub fn new(address: usize, interface: Arc<CallInterface>) -> Result<Self, InvocationError> {
        if address == 0 {
            return Err(InvocationError::NullTarget);
        }
        Ok(Self { address, interface })
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }

    #[inline]
    pub fn interface(&self) -> &Arc<CallInterface> {
        &self.interface
    }

    /// Call the function with `args`
    ///
    /// Struct results are returned as a view over a fresh buffer-backed
    /// struct.
    ///
    /// # Safety
    /// Caller must ensure:
    /// - The address is a live function whose C signature matches the interface
    /// - Pointer arguments are valid for whatever the callee does with them
    pub unsafe fn call(&self, args: &[Value]) -> Result<Value, InvocationError> {
        let mut frame = ArgFrame::marshal(self.interface.params(), args)?;
        let mut avalue = frame.pointers();
        let code = CodePtr::from_ptr(self.address as *const c_void);

        log_ffi_call(self.address, args.len());
        counters::CALLS_MADE.fetch_add(1, Ordering::Relaxed);

        let result = match self.interface.ret() {
            TypeDescriptor::Struct(layout) => {
                let staging = Pointer::new_struct(layout.clone())?;
                ffi_call(
                    self.interface.raw(),
                    Some(*code.as_fun()),
                    staging.as_ptr::<c_void>(),
                    avalue.as_mut_ptr(),
                );
                Value::Struct(staging)
            }
            ret => {
                let mut slot = ReturnSlot::new();
                ffi_call(
                    self.interface.raw(),
                    Some(*code.as_fun()),
                    slot.as_mut_ptr(),
                    avalue.as_mut_ptr(),
                );
                read_return(slot.as_mut_ptr(), ret)
            }
        };

        log_ffi_return(self.address);
        Ok(result)
    }
}

/// Invoke the native function at `address` through `interface`
///
/// # Safety
/// See [`FunctionCall::call`].
#[inline]
pub unsafe fn invoke(
    address: usize,
    interface: &Arc<CallInterface>,
    args: &[Value],
) -> Result<Value, InvocationError> {
    FunctionCall::new(address, interface.clone())?.call(args)
}
