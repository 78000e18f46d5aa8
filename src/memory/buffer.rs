//! Managed byte buffers backing buffer-backed views
//!
//! A buffer is a zeroed block from the global allocator, shared through
//! `Arc` by every view derived from it and released when the last one drops.

use crate::error::AllocError;
use crate::logging::{log_allocation, log_deallocation};
use std::alloc::{alloc_zeroed, dealloc, Layout};

/// Alignment of every buffer; covers all primitive C types
pub const BUFFER_ALIGN: usize = 16;

/// Zeroed managed allocation
pub struct Buffer {
    start: *mut u8,
    len: usize,
    layout: Layout,
}

impl Buffer {
    /// Allocate `len` zeroed bytes
    ///
    /// A zero-length request still reserves one byte so the base address is
    /// unique and non-null.
    pub fn zeroed(len: usize) -> Result<Self, AllocError> {
        let layout = Layout::from_size_align(len.max(1), BUFFER_ALIGN)
            .map_err(|_| AllocError::OutOfMemory(len))?;

        let start = unsafe { alloc_zeroed(layout) };
        if start.is_null() {
            return Err(AllocError::OutOfMemory(len));
        }

        log_allocation(len, start as usize);
        Ok(Self { start, len, layout })
    }

    /// Allocate and fill with `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AllocError> {
        let buffer = Self::zeroed(bytes.len())?;
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.start, bytes.len());
        }
        Ok(buffer)
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.start as usize
    }

    /// Usable length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `[address, address + size)` lies inside the buffer
    #[inline]
    pub fn contains(&self, address: usize, size: usize) -> bool {
        let start = self.address();
        address >= start
            && address
                .checked_add(size)
                .is_some_and(|end| end <= start + self.len)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        log_deallocation(self.start as usize);
        unsafe {
            dealloc(self.start, self.layout);
        }
    }
}

// The buffer exclusively owns its block; access discipline is left to views.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl core::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Buffer")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.len)
            .finish()
    }
}
