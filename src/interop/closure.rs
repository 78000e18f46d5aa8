//! Callback trampolines: managed functions exposed as native function pointers
//!
//! A trampoline owns a libffi closure whose user data pairs the call
//! interface with the managed function. The native code pointer stays valid
//! while the trampoline is alive; `NativeFunction` values keep it alive
//! through shared ownership.

use super::call::FunctionCall;
use super::cif::CallInterface;
use super::counters;
use super::marshal::{read_argument, write_return};
use crate::error::InvocationError;
use crate::logging::{error, log_callback, warn};
use crate::memory::{Pointer, Value};
use crate::types::TypeDescriptor;
use core::ffi::c_void;
use libffi::low::{closure_alloc, closure_free, prep_closure, CodePtr};
use libffi::raw::{ffi_cif, ffi_closure};
use smallvec::SmallVec;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Managed function callable from native code
pub type ManagedFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

struct ClosureContext {
    code: usize,
    interface: Arc<CallInterface>,
    function: ManagedFn,
}

/// Owner of a prepared libffi closure
pub struct Trampoline {
    closure: *mut ffi_closure,
    code: CodePtr,
    // Read by the closure on every call; freed after the closure.
    context: Box<ClosureContext>,
}

impl Trampoline {
    /// Allocate and prepare a closure dispatching to `function`
    pub fn new(function: ManagedFn, interface: Arc<CallInterface>) -> Result<Self, InvocationError> {
        let (closure, code) = closure_alloc();
        if closure.is_null() {
            return Err(InvocationError::ClosurePrep("closure allocation failed".into()));
        }

        let context = Box::new(ClosureContext {
            code: code.as_ptr() as usize,
            interface,
            function,
        });

        let prepared = unsafe {
            prep_closure(
                closure,
                context.interface.raw(),
                dispatch,
                &*context as *const ClosureContext,
                code,
            )
        };
        if let Err(e) = prepared {
            unsafe { closure_free(closure) };
            return Err(InvocationError::ClosurePrep(format!("{:?}", e)));
        }

        Ok(Self {
            closure,
            code,
            context,
        })
    }

    /// Native entry point
    #[inline]
    pub fn address(&self) -> usize {
        self.code.as_ptr() as usize
    }

    #[inline]
    pub fn interface(&self) -> &Arc<CallInterface> {
        &self.context.interface
    }
}

impl Drop for Trampoline {
    fn drop(&mut self) {
        unsafe { closure_free(self.closure) };
    }
}

// The closure is immutable after preparation and the context only holds
// `Send + Sync` data.
unsafe impl Send for Trampoline {}
unsafe impl Sync for Trampoline {}

/// libffi closure handler
///
/// Unwinding out of here would cross native frames, so a panicking managed
/// function aborts the process.
unsafe extern "C" fn dispatch(
    cif: &ffi_cif,
    result: &mut c_void,
    args: *const *const c_void,
    context: &ClosureContext,
) {
    let result = result as *mut c_void;
    let interface = &context.interface;
    let params = interface.params();
    let arg_count = cif.nargs as usize;

    log_callback(context.code, arg_count);
    counters::CALLBACKS_INVOKED.fetch_add(1, Ordering::Relaxed);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut values: SmallVec<[Value; 8]> = SmallVec::with_capacity(params.len());
        for (i, ty) in params.iter().enumerate() {
            match read_argument(*args.add(i), ty) {
                Ok(value) => values.push(value),
                Err(e) => panic!("callback argument {} could not be staged: {}", i, e),
            }
        }
        (context.function)(&values)
    }));

    let value = match outcome {
        Ok(value) => value,
        Err(_) => {
            error!(
                target: "abicall::callback",
                signature = %interface.signature(),
                "managed callback panicked; aborting"
            );
            std::process::abort();
        }
    };

    if !write_return(result, interface.ret(), &value) {
        warn!(
            target: "abicall::callback",
            signature = %interface.signature(),
            found = value.kind_name(),
            "callback returned mismatched value; returning zero"
        );
    }
}

/// Native function pointer with its call interface
///
/// When produced by [`wrap`] from a managed function, the value keeps the
/// trampoline alive. Retaining only [`NativeFunction::address`] past the
/// last clone is a use-after-free hazard.
#[derive(Clone)]
pub struct NativeFunction {
    address: usize,
    interface: Arc<CallInterface>,
    keep_alive: Option<Arc<Trampoline>>,
}

impl NativeFunction {
    /// Native function at `address`, owned elsewhere
    pub fn from_address(address: usize, interface: Arc<CallInterface>) -> Self {
        Self {
            address,
            interface,
            keep_alive: None,
        }
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }

    #[inline]
    pub fn interface(&self) -> &Arc<CallInterface> {
        &self.interface
    }

    /// Whether this pointer is backed by a trampoline it keeps alive
    #[inline]
    pub fn is_trampoline(&self) -> bool {
        self.keep_alive.is_some()
    }

    /// Pointer value suitable for passing as a function-pointer argument
    pub fn to_value(&self) -> Value {
        Value::Pointer(Pointer::wrap(self.address, TypeDescriptor::Void))
    }

    /// Call through the function pointer
    ///
    /// # Safety
    /// See [`FunctionCall::call`].
    pub unsafe fn call(&self, args: &[Value]) -> Result<Value, InvocationError> {
        FunctionCall::new(self.address, self.interface.clone())?.call(args)
    }
}

impl core::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("address", &format_args!("{:#x}", self.address))
            .field("signature", &format_args!("{}", self.interface.signature()))
            .field("trampoline", &self.is_trampoline())
            .finish()
    }
}

impl From<&NativeFunction> for Value {
    fn from(function: &NativeFunction) -> Self {
        function.to_value()
    }
}

/// Something that can be exposed to native code
#[derive(Clone)]
pub enum Callable {
    Managed(ManagedFn),
    Native(NativeFunction),
}

impl Callable {
    /// Managed callable from a closure
    pub fn managed<F>(function: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self::Managed(Arc::new(function))
    }
}

impl From<NativeFunction> for Callable {
    fn from(function: NativeFunction) -> Self {
        Self::Native(function)
    }
}

/// Expose `callable` as a native function pointer of type `interface`
///
/// Native function pointers, including existing trampolines, are returned
/// unchanged. They keep the interface they were created with; a different
/// `interface` is logged and ignored.
pub fn wrap(callable: Callable, interface: Arc<CallInterface>) -> Result<NativeFunction, InvocationError> {
    match callable {
        Callable::Native(function) => {
            if function.interface().signature() != interface.signature() {
                warn!(
                    target: "abicall::callback",
                    address = function.address(),
                    own = %function.interface().signature(),
                    requested = %interface.signature(),
                    "native function keeps its own interface"
                );
            }
            Ok(function)
        }
        Callable::Managed(function) => {
            let trampoline = Arc::new(Trampoline::new(function, interface.clone())?);
            Ok(NativeFunction {
                address: trampoline.address(),
                interface,
                keep_alive: Some(trampoline),
            })
        }
    }
}
