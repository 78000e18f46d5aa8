//! Interoperability - call native functions and be called back by them
//!
//! Architecture:
//! - `abi.rs` - Calling convention shapes (System V, Win64, ARM)
//! - `cif.rs` - Call interface builder and process-wide cache
//! - `marshal.rs` - Value ↔ libffi slot conversions
//! - `call.rs` - Native call dispatch
//! - `closure.rs` - Callback trampolines
//! - `library.rs` - Dynamic library loading (dlopen/LoadLibrary)
//! - `linker.rs` - Binding declarations to resolved symbols

mod abi;
mod call;
mod cif;
mod closure;
mod library;
mod linker;
mod marshal;

pub use abi::{classify_params, ArgClass, ArgShape, CallingConvention, Placement, RegisterAllocator};
pub use call::{invoke, FunctionCall};
pub use cif::{cached_interfaces, CallInterface, Signature};
pub use closure::{wrap, Callable, ManagedFn, NativeFunction, Trampoline};
pub use library::Library;
pub use linker::{Declaration, LinkPolicy, LinkReport, LinkedModule, Linker, NativeBinding};

use std::sync::atomic::Ordering;

pub(crate) mod counters {
    use std::sync::atomic::AtomicU64;

    pub static CALLS_MADE: AtomicU64 = AtomicU64::new(0);
    pub static CALLBACKS_INVOKED: AtomicU64 = AtomicU64::new(0);
    pub static INTERFACES_BUILT: AtomicU64 = AtomicU64::new(0);
    pub static LIBRARIES_LOADED: AtomicU64 = AtomicU64::new(0);
}

/// Get interop statistics
pub fn stats() -> InteropStats {
    InteropStats {
        calls_made: counters::CALLS_MADE.load(Ordering::Relaxed),
        callbacks_invoked: counters::CALLBACKS_INVOKED.load(Ordering::Relaxed),
        interfaces_built: counters::INTERFACES_BUILT.load(Ordering::Relaxed),
        libraries_loaded: counters::LIBRARIES_LOADED.load(Ordering::Relaxed),
    }
}

/// Interop statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteropStats {
    pub calls_made: u64,
    pub callbacks_invoked: u64,
    pub interfaces_built: u64,
    pub libraries_loaded: u64,
}
