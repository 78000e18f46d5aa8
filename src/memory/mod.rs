//! Typed memory views over native memory
//!
//! Design: A `Pointer` is an (address, element type) window plus a
//! `Backing` tag recording who owns the bytes:
//! - `Borrowed` aliases memory owned elsewhere and never frees it
//! - `Heap` owns a `malloc`/`calloc` block and frees it on drop
//! - `Buffer` shares a managed zeroed buffer and enforces its extent
//!
//! The element kind is resolved once into a `Handler` when the view is
//! constructed, so reads and writes dispatch on a closed enum.
//!
//! Reads and writes on borrowed and heap views are not bounds checked. They
//! are `unsafe` and the caller guarantees the address is valid for the
//! access.

mod buffer;
mod value;

#[cfg(test)]
mod tests;

pub use buffer::{Buffer, BUFFER_ALIGN};
pub use value::{Scalar, Value};

use crate::error::{AllocError, ValueError};
use crate::layout::StructLayout;
use crate::logging::{log_allocation, log_deallocation};
use crate::types::{IntWidth, TypeDescriptor};
use core::ffi::{c_char, c_long, c_ulong, c_void, CStr};
use core::hash::{Hash, Hasher};
use core::mem::size_of;
use core::ptr;
use core::slice;
use std::sync::Arc;

/// Access strategy for a view's element kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Void,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    /// Platform `long`, widened to 64 bits on read
    Long { signed: bool },
    F32,
    F64,
    Pointer,
    Struct,
    /// Synthesized indirection produced by `cast_pp`; dereferencing yields
    /// the underlying view instead of reading memory
    Indirect { levels: u8 },
}

impl Handler {
    /// Resolve the handler for an element descriptor
    pub fn resolve(element: &TypeDescriptor) -> Self {
        match element {
            TypeDescriptor::Void => Self::Void,
            TypeDescriptor::Int { width, signed } => match (width, signed) {
                (IntWidth::W8, true) => Self::I8,
                (IntWidth::W8, false) => Self::U8,
                (IntWidth::W16, true) => Self::I16,
                (IntWidth::W16, false) => Self::U16,
                (IntWidth::W32, true) => Self::I32,
                (IntWidth::W32, false) => Self::U32,
                (IntWidth::W64, true) => Self::I64,
                (IntWidth::W64, false) => Self::U64,
                (IntWidth::Long, signed) => Self::Long { signed: *signed },
            },
            TypeDescriptor::F32 => Self::F32,
            TypeDescriptor::F64 => Self::F64,
            TypeDescriptor::Pointer(_) => Self::Pointer,
            TypeDescriptor::Struct(_) => Self::Struct,
        }
    }
}

/// Ownership of the bytes behind a view
#[derive(Debug, Clone)]
enum Backing {
    Borrowed,
    Heap,
    Buffer(Arc<Buffer>),
}

/// Typed view over native memory
///
/// Views compare and hash by address only.
pub struct Pointer {
    address: usize,
    element: TypeDescriptor,
    handler: Handler,
    backing: Backing,
}

impl Pointer {
    /// Borrowed view of `address` typed as `element`
    ///
    /// Constructing a view is safe; every access through it is not.
    pub fn wrap(address: usize, element: TypeDescriptor) -> Self {
        Self::with_backing(address, element, Backing::Borrowed)
    }

    /// Null view
    pub fn null(element: TypeDescriptor) -> Self {
        Self::wrap(0, element)
    }

    fn with_backing(address: usize, element: TypeDescriptor, backing: Backing) -> Self {
        let handler = Handler::resolve(&element);
        Self {
            address,
            element,
            handler,
            backing,
        }
    }

    /// View over the start of a managed buffer
    pub fn from_buffer(buffer: Arc<Buffer>, element: TypeDescriptor) -> Self {
        let address = buffer.address();
        Self::with_backing(address, element, Backing::Buffer(buffer))
    }

    /// Heap-owned view of `size` uninitialized bytes from `malloc`
    pub fn malloc(size: usize, element: TypeDescriptor) -> Result<Self, AllocError> {
        let raw = unsafe { libc::malloc(size.max(1)) };
        if raw.is_null() {
            return Err(AllocError::OutOfMemory(size));
        }
        log_allocation(size, raw as usize);
        Ok(Self::with_backing(raw as usize, element, Backing::Heap))
    }

    /// Heap-owned view of `nmemb * size` zeroed bytes from `calloc`
    pub fn calloc(nmemb: usize, size: usize, element: TypeDescriptor) -> Result<Self, AllocError> {
        let total = nmemb
            .checked_mul(size)
            .ok_or(AllocError::Overflow { nmemb, size })?;
        let raw = unsafe { libc::calloc(nmemb.max(1), size.max(1)) };
        if raw.is_null() {
            return Err(AllocError::OutOfMemory(total));
        }
        log_allocation(total, raw as usize);
        Ok(Self::with_backing(raw as usize, element, Backing::Heap))
    }

    /// Buffer-backed view of `len` zeroed bytes
    pub fn buffer(len: usize, element: TypeDescriptor) -> Result<Self, AllocError> {
        Ok(Self::from_buffer(Arc::new(Buffer::zeroed(len)?), element))
    }

    /// Zeroed, buffer-backed struct instance
    pub fn new_struct(layout: Arc<StructLayout>) -> Result<Self, AllocError> {
        Self::buffer(layout.size(), TypeDescriptor::Struct(layout))
    }

    /// Buffer-backed copy of `values`
    pub fn nref<T: Scalar>(values: &[T]) -> Result<Self, AllocError> {
        if values.is_empty() {
            return Err(AllocError::ZeroLength);
        }
        let view = Self::buffer(values.len() * size_of::<T>(), T::descriptor())?;
        unsafe {
            ptr::copy_nonoverlapping(values.as_ptr(), view.address as *mut T, values.len());
        }
        Ok(view)
    }

    /// Buffer-backed array of the addresses of `values`
    ///
    /// The element type is a pointer to the first view's element type. The
    /// pointees are not kept alive by the array.
    pub fn nref_pointers(values: &[Pointer]) -> Result<Self, AllocError> {
        let first = values.first().ok_or(AllocError::ZeroLength)?;
        let element = TypeDescriptor::pointer_to(first.element.clone());
        let view = Self::buffer(values.len() * size_of::<usize>(), element)?;
        let slots = view.address as *mut usize;
        for (i, value) in values.iter().enumerate() {
            unsafe {
                slots.add(i).write_unaligned(value.address);
            }
        }
        Ok(view)
    }

    /// Buffer-backed NUL-terminated copy of `value`
    ///
    /// The empty string yields a single NUL byte.
    pub fn nref_str(value: &str) -> Result<Self, AllocError> {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        let buffer = Buffer::from_bytes(&bytes)?;
        Ok(Self::from_buffer(Arc::new(buffer), TypeDescriptor::i8()))
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }

    #[inline]
    pub fn as_ptr<T>(&self) -> *mut T {
        self.address as *mut T
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.address == 0
    }

    #[inline]
    pub fn element(&self) -> &TypeDescriptor {
        &self.element
    }

    #[inline]
    pub fn handler(&self) -> Handler {
        self.handler
    }

    /// Bytes between consecutive elements
    ///
    /// `void` elements step one byte at a time.
    pub fn element_size(&self) -> usize {
        match self.handler {
            Handler::Void => 1,
            Handler::Indirect { .. } => size_of::<usize>(),
            _ => self.element.stride(),
        }
    }

    /// Whether dropping this view releases memory
    pub fn is_owned(&self) -> bool {
        matches!(self.backing, Backing::Heap)
    }

    /// Bytes addressable from this view, when known
    pub fn extent(&self) -> Option<usize> {
        match &self.backing {
            Backing::Buffer(buffer) => {
                let end = buffer.address() + buffer.len();
                Some(end.saturating_sub(self.address))
            }
            _ => None,
        }
    }

    /// Give up ownership of a heap block without freeing it
    pub fn leak(mut self) -> usize {
        if matches!(self.backing, Backing::Heap) {
            self.backing = Backing::Borrowed;
        }
        self.address
    }

    /// Backing for a view derived from this one
    fn alias(&self) -> Backing {
        match &self.backing {
            Backing::Buffer(buffer) => Backing::Buffer(buffer.clone()),
            _ => Backing::Borrowed,
        }
    }

    fn derive(&self, address: usize, element: TypeDescriptor) -> Self {
        Self::with_backing(address, element, self.alias())
    }

    /// View `n` elements away (negative `n` moves backwards)
    pub fn offset(&self, n: isize) -> Self {
        let delta = n.wrapping_mul(self.element_size() as isize);
        Self {
            address: self.address.wrapping_add_signed(delta),
            element: self.element.clone(),
            handler: self.handler,
            backing: self.alias(),
        }
    }

    /// Reinterpret the same address as `element`
    pub fn cast(&self, element: TypeDescriptor) -> Self {
        self.derive(self.address, element)
    }

    /// View one indirection deeper over the same address
    ///
    /// Dereferencing the result yields a view equal to `self` without
    /// reading memory.
    pub fn cast_pp(&self) -> Self {
        let levels = match self.handler {
            Handler::Indirect { levels } => levels.saturating_add(1),
            _ => 1,
        };
        Self {
            address: self.address,
            element: TypeDescriptor::pointer_to(self.element.clone()),
            handler: Handler::Indirect { levels },
            backing: self.alias(),
        }
    }

    /// Sub-view of a struct field, typed by the field descriptor
    ///
    /// Array fields yield a view of their first element.
    pub fn field(&self, name: &str) -> Result<Self, ValueError> {
        let layout = match (&self.handler, &self.element) {
            (Handler::Struct, TypeDescriptor::Struct(layout)) => layout,
            _ => return Err(ValueError::NotAStruct(self.element.to_string())),
        };
        let field = layout.field(name).ok_or_else(|| ValueError::UnknownField {
            strukt: layout.name().to_string(),
            field: name.to_string(),
        })?;
        Ok(self.derive(self.address + field.offset(), field.ty().clone()))
    }

    /// Reinterpret the address itself as a scalar
    pub fn cast_value<T: Scalar>(&self) -> T {
        T::from_address(self.address)
    }

    /// Whether an access stays inside the backing buffer (always true when
    /// the view has no known extent)
    #[inline]
    fn within_extent(&self, address: usize, size: usize) -> bool {
        match &self.backing {
            Backing::Buffer(buffer) => buffer.contains(address, size),
            _ => true,
        }
    }

    /// Panic if a buffer-backed read would leave the buffer
    #[inline]
    fn check_extent(&self, address: usize, size: usize) {
        if let Backing::Buffer(buffer) = &self.backing {
            assert!(
                buffer.contains(address, size),
                "access of {} bytes at {:#x} is outside buffer {:?}",
                size,
                address,
                buffer
            );
        }
    }

    fn ensure_extent(&self, address: usize, size: usize) -> Result<(), ValueError> {
        if self.within_extent(address, size) {
            Ok(())
        } else {
            Err(ValueError::OutOfExtent { address, size })
        }
    }

    #[inline]
    fn element_address(&self, index: usize) -> usize {
        self.address
            .wrapping_add(index.wrapping_mul(self.element_size()))
    }

    /// Read the element at the view's address
    ///
    /// # Safety
    /// The address must be valid for a read of the element type unless the
    /// view is buffer-backed.
    pub unsafe fn read(&self) -> Value {
        self.read_at(0)
    }

    /// Read the element `index` positions from the view's address
    ///
    /// # Safety
    /// See [`Pointer::read`].
    pub unsafe fn read_at(&self, index: usize) -> Value {
        let at = self.element_address(index);
        if let Handler::Indirect { levels } = self.handler {
            return Value::Pointer(self.indirect_target(at, levels));
        }
        let size = self.element.size();
        self.check_extent(at, size);
        match self.handler {
            Handler::Void => Value::Void,
            Handler::I8 => Value::I8(read_raw(at)),
            Handler::U8 => Value::U8(read_raw(at)),
            Handler::I16 => Value::I16(read_raw(at)),
            Handler::U16 => Value::U16(read_raw(at)),
            Handler::I32 => Value::I32(read_raw(at)),
            Handler::U32 => Value::U32(read_raw(at)),
            Handler::I64 => Value::I64(read_raw(at)),
            Handler::U64 => Value::U64(read_raw(at)),
            Handler::Long { signed: true } => Value::I64(read_raw::<c_long>(at) as i64),
            Handler::Long { signed: false } => Value::U64(read_raw::<c_ulong>(at) as u64),
            Handler::F32 => Value::F32(read_raw(at)),
            Handler::F64 => Value::F64(read_raw(at)),
            Handler::Pointer => {
                let target = read_raw::<usize>(at);
                let pointee = self.element.pointee().cloned().unwrap_or(TypeDescriptor::Void);
                Value::Pointer(Pointer::wrap(target, pointee))
            }
            Handler::Struct => Value::Struct(self.derive(at, self.element.clone())),
            Handler::Indirect { .. } => unreachable!("handled above"),
        }
    }

    fn indirect_target(&self, at: usize, levels: u8) -> Pointer {
        let inner = self
            .element
            .pointee()
            .cloned()
            .unwrap_or(TypeDescriptor::Void);
        let handler = if levels > 1 {
            Handler::Indirect { levels: levels - 1 }
        } else {
            Handler::resolve(&inner)
        };
        Pointer {
            address: at,
            element: inner,
            handler,
            backing: self.alias(),
        }
    }

    /// Write `value` at the view's address
    ///
    /// # Safety
    /// The address must be valid for a write of the element type unless the
    /// view is buffer-backed.
    pub unsafe fn write(&self, value: &Value) -> Result<(), ValueError> {
        self.write_at(0, value)
    }

    /// Write `value` `index` positions from the view's address
    ///
    /// Native `long` writes truncate to the platform width. A write that
    /// would leave a buffer-backed view's extent is `ValueError::OutOfExtent`
    /// and touches nothing.
    ///
    /// # Safety
    /// See [`Pointer::write`].
    pub unsafe fn write_at(&self, index: usize, value: &Value) -> Result<(), ValueError> {
        if let Handler::Indirect { .. } = self.handler {
            return Err(ValueError::ReadOnlyIndirection);
        }
        if matches!(self.handler, Handler::Void) || !value.fits(&self.element) {
            return Err(ValueError::TypeMismatch {
                expected: self.element.to_string(),
                found: value.kind_name(),
            });
        }

        let at = self.element_address(index);
        self.ensure_extent(at, self.element.size())?;
        match *value {
            Value::I8(v) => write_raw(at, v),
            Value::U8(v) => write_raw(at, v),
            Value::I16(v) => write_raw(at, v),
            Value::U16(v) => write_raw(at, v),
            Value::I32(v) => write_raw(at, v),
            Value::U32(v) => write_raw(at, v),
            Value::I64(v) => match self.handler {
                Handler::Long { .. } => write_raw(at, v as c_long),
                _ => write_raw(at, v),
            },
            Value::U64(v) => match self.handler {
                Handler::Long { .. } => write_raw(at, v as c_ulong),
                _ => write_raw(at, v),
            },
            Value::F32(v) => write_raw(at, v),
            Value::F64(v) => write_raw(at, v),
            Value::Pointer(ref p) => write_raw(at, p.address),
            Value::Struct(ref source) => {
                let size = self.element.size();
                source.ensure_extent(source.address, size)?;
                ptr::copy(source.address as *const u8, at as *mut u8, size);
            }
            Value::Void => unreachable!("void never fits a writable element"),
        }
        Ok(())
    }

    /// Read a `T` at `index * size_of::<T>()` bytes from the view
    ///
    /// # Safety
    /// See [`Pointer::read`].
    pub unsafe fn read_scalar<T: Scalar>(&self, index: usize) -> T {
        let at = self.address + index * size_of::<T>();
        self.check_extent(at, size_of::<T>());
        read_raw(at)
    }

    /// Write a `T` at `index * size_of::<T>()` bytes from the view
    ///
    /// Panics when a buffer-backed write would leave the buffer; use
    /// [`Pointer::write_at`] to get an error instead.
    ///
    /// # Safety
    /// See [`Pointer::write`].
    pub unsafe fn write_scalar<T: Scalar>(&self, index: usize, value: T) {
        let at = self.address + index * size_of::<T>();
        self.check_extent(at, size_of::<T>());
        write_raw(at, value);
    }

    /// Read the NUL-terminated string at the view's address
    ///
    /// Invalid UTF-8 is replaced. Returns `None` for a null view, and for a
    /// buffer-backed view with no NUL before the end of its buffer.
    ///
    /// # Safety
    /// Unless the view is buffer-backed, the address must point to a
    /// NUL-terminated byte sequence.
    pub unsafe fn read_c_str(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        let s = match &self.backing {
            Backing::Buffer(buffer) => {
                self.check_extent(self.address, 1);
                let end = buffer.address() + buffer.len();
                let bytes = slice::from_raw_parts(self.address as *const u8, end - self.address);
                CStr::from_bytes_until_nul(bytes).ok()?
            }
            _ => CStr::from_ptr(self.address as *const c_char),
        };
        Some(s.to_string_lossy().into_owned())
    }
}

#[inline(always)]
unsafe fn read_raw<T: Copy>(address: usize) -> T {
    ptr::read_unaligned(address as *const T)
}

#[inline(always)]
unsafe fn write_raw<T: Copy>(address: usize, value: T) {
    ptr::write_unaligned(address as *mut T, value)
}

impl Clone for Pointer {
    /// Heap-owned views clone into borrowed aliases so the block is freed
    /// exactly once.
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            element: self.element.clone(),
            handler: self.handler,
            backing: self.alias(),
        }
    }
}

impl Drop for Pointer {
    fn drop(&mut self) {
        if let Backing::Heap = self.backing {
            log_deallocation(self.address);
            unsafe {
                libc::free(self.address as *mut c_void);
            }
        }
    }
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Pointer {}

impl Hash for Pointer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl core::fmt::Debug for Pointer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let backing = match self.backing {
            Backing::Borrowed => "borrowed",
            Backing::Heap => "heap",
            Backing::Buffer(_) => "buffer",
        };
        f.debug_struct("Pointer")
            .field("address", &format_args!("{:#x}", self.address))
            .field("element", &format_args!("{}", self.element))
            .field("backing", &backing)
            .finish()
    }
}
