//! ABI (Application Binary Interface) shape classification
//!
//! Records, per argument, how the platform calling convention passes it:
//! register class, word count and register/stack placement. libffi performs
//! the actual placement; the shapes are kept on the call interface for
//! inspection and diagnostics.

use crate::types::TypeDescriptor;
use core::mem::size_of;

/// Calling convention specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallingConvention {
    /// C calling convention (platform default)
    C,
    /// System V AMD64 ABI (Unix x86-64)
    SysV,
    /// Microsoft x64 calling convention (Windows)
    Win64,
    /// ARM AAPCS (ARM 32-bit)
    Aapcs,
    /// ARM64 calling convention
    Aarch64,
}

impl CallingConvention {
    /// Platform default
    #[inline]
    pub const fn platform() -> Self {
        #[cfg(all(target_arch = "x86_64", target_os = "windows"))]
        return Self::Win64;

        #[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
        return Self::SysV;

        #[cfg(target_arch = "aarch64")]
        return Self::Aarch64;

        #[cfg(target_arch = "arm")]
        return Self::Aapcs;

        #[cfg(not(any(
            target_arch = "x86_64",
            target_arch = "aarch64",
            target_arch = "arm"
        )))]
        return Self::C;
    }

    /// Maximum register arguments per class
    #[inline]
    pub const fn max_register_args(self) -> usize {
        match self {
            Self::C => 6,
            Self::SysV => 6,    // RDI, RSI, RDX, RCX, R8, R9
            Self::Win64 => 4,   // RCX, RDX, R8, R9
            Self::Aapcs => 4,   // R0-R3
            Self::Aarch64 => 8, // X0-X7
        }
    }

    /// Check if floating-point args use separate registers
    #[inline]
    pub const fn has_fp_registers(self) -> bool {
        matches!(self, Self::SysV | Self::Win64 | Self::Aarch64)
    }

    /// Whether a by-value aggregate of `size` bytes is passed as a pointer
    /// to a caller-owned copy
    pub const fn passes_by_reference(self, size: usize) -> bool {
        match self {
            Self::Win64 => !matches!(size, 1 | 2 | 4 | 8),
            Self::Aarch64 => size > 16,
            Self::SysV | Self::C | Self::Aapcs => false,
        }
    }

    /// Largest aggregate that can travel in registers
    pub const fn max_register_aggregate(self) -> usize {
        match self {
            Self::Win64 => 8,
            Self::SysV | Self::Aarch64 => 16,
            Self::Aapcs | Self::C => 4 * size_of::<usize>(),
        }
    }
}

impl Default for CallingConvention {
    #[inline]
    fn default() -> Self {
        Self::platform()
    }
}

/// Register class of an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgClass {
    Integer,
    Float,
    Aggregate,
}

/// Where an argument ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    Register,
    Stack,
}

/// ABI shape of one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgShape {
    pub class: ArgClass,
    /// Machine words occupied by the value
    pub words: usize,
    pub placement: Placement,
    /// Passed as a pointer to a copy rather than by value
    pub by_reference: bool,
}

/// Register allocation tracking for one call
pub struct RegisterAllocator {
    convention: CallingConvention,
    int_regs_used: usize,
    fp_regs_used: usize,
}

impl RegisterAllocator {
    /// Create allocator for calling convention
    #[inline]
    pub const fn new(convention: CallingConvention) -> Self {
        Self {
            convention,
            int_regs_used: 0,
            fp_regs_used: 0,
        }
    }

    /// Check if `count` registers of the class are still free
    #[inline]
    pub fn can_use_registers(&self, is_float: bool, count: usize) -> bool {
        let max = self.convention.max_register_args();
        if is_float && self.convention.has_fp_registers() {
            self.fp_regs_used + count <= max
        } else {
            self.int_regs_used + count <= max
        }
    }

    /// Mark registers as used
    #[inline]
    pub fn use_registers(&mut self, is_float: bool, count: usize) {
        if is_float && self.convention.has_fp_registers() {
            self.fp_regs_used += count;
        } else {
            self.int_regs_used += count;
        }
    }

    /// Classify the next argument and consume its registers
    pub fn classify(&mut self, ty: &TypeDescriptor) -> ArgShape {
        let word = size_of::<usize>();
        let size = ty.size();
        let words = size.div_ceil(word).max(1);

        let (class, by_reference) = match ty {
            TypeDescriptor::F32 | TypeDescriptor::F64 => (ArgClass::Float, false),
            TypeDescriptor::Struct(_) => (
                ArgClass::Aggregate,
                self.convention.passes_by_reference(size),
            ),
            _ => (ArgClass::Integer, false),
        };

        // A by-reference aggregate travels as one pointer word.
        let (is_float, needed) = match class {
            ArgClass::Float => (true, 1),
            ArgClass::Integer => (false, words),
            ArgClass::Aggregate if by_reference => (false, 1),
            ArgClass::Aggregate => (false, words),
        };

        let fits_registers = class != ArgClass::Aggregate
            || by_reference
            || size <= self.convention.max_register_aggregate();

        let placement = if fits_registers && self.can_use_registers(is_float, needed) {
            self.use_registers(is_float, needed);
            Placement::Register
        } else {
            Placement::Stack
        };

        ArgShape {
            class,
            words,
            placement,
            by_reference,
        }
    }
}

/// Shapes of every parameter in order
pub fn classify_params(convention: CallingConvention, params: &[TypeDescriptor]) -> Vec<ArgShape> {
    let mut allocator = RegisterAllocator::new(convention);
    params.iter().map(|p| allocator.classify(p)).collect()
}
