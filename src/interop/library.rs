//! Dynamic library loading and symbol resolution
//!
//! Platform-agnostic wrapper around dlopen/LoadLibrary. The library is
//! unloaded on drop; bindings resolved from it must not outlive it.

use super::counters;
use crate::error::LinkError;
use crate::logging::{log_library_loaded, log_symbol_missing, log_symbol_resolved};
use core::ffi::c_void;
use core::ptr::NonNull;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

/// Handle to a dynamically loaded library
pub struct Library {
    handle: NonNull<c_void>,
    name: String,
    /// Whether dropping the handle unloads a reference we took
    owned: bool,
}

impl Library {
    /// Load a library by path or by name through the platform search rules
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LinkError> {
        let name = path.as_ref().to_string_lossy().into_owned();
        let handle = Self::load_impl(&name)?;
        counters::LIBRARIES_LOADED.fetch_add(1, Ordering::Relaxed);
        log_library_loaded(&name);
        Ok(Self {
            handle,
            name,
            owned: true,
        })
    }

    /// Load `name` from the first search path that contains it, falling back
    /// to the platform search rules
    pub fn open_in(name: &str, search_paths: &[PathBuf]) -> Result<Self, LinkError> {
        match search_paths.iter().map(|dir| dir.join(name)).find(|p| p.is_file()) {
            Some(path) => Self::open(path),
            None => Self::open(name),
        }
    }

    /// Symbols of the running executable and everything it has loaded
    pub fn this_process() -> Result<Self, LinkError> {
        let handle = Self::process_impl()?;
        Ok(Self {
            handle,
            name: "<process>".to_string(),
            owned: cfg!(unix),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(unix)]
    fn load_impl(name: &str) -> Result<NonNull<c_void>, LinkError> {
        let cname =
            CString::new(name).map_err(|_| LinkError::InvalidLibraryName(name.to_string()))?;
        let handle = unsafe { libc::dlopen(cname.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        NonNull::new(handle).ok_or_else(|| LinkError::LoadFailed {
            name: name.to_string(),
            reason: dl_error(),
        })
    }

    #[cfg(unix)]
    fn process_impl() -> Result<NonNull<c_void>, LinkError> {
        let handle = unsafe { libc::dlopen(core::ptr::null(), libc::RTLD_NOW) };
        NonNull::new(handle).ok_or_else(|| LinkError::LoadFailed {
            name: "<process>".to_string(),
            reason: dl_error(),
        })
    }

    #[cfg(windows)]
    fn load_impl(name: &str) -> Result<NonNull<c_void>, LinkError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::errhandlingapi::GetLastError;
        use winapi::um::libloaderapi::LoadLibraryW;

        if name.contains('\0') {
            return Err(LinkError::InvalidLibraryName(name.to_string()));
        }
        let wide: Vec<u16> = OsStr::new(name).encode_wide().chain(Some(0)).collect();

        unsafe {
            let handle = LoadLibraryW(wide.as_ptr());
            NonNull::new(handle as *mut c_void).ok_or_else(|| LinkError::LoadFailed {
                name: name.to_string(),
                reason: format!("error code {}", GetLastError()),
            })
        }
    }

    #[cfg(windows)]
    fn process_impl() -> Result<NonNull<c_void>, LinkError> {
        use winapi::um::errhandlingapi::GetLastError;
        use winapi::um::libloaderapi::GetModuleHandleW;

        unsafe {
            let handle = GetModuleHandleW(core::ptr::null());
            NonNull::new(handle as *mut c_void).ok_or_else(|| LinkError::LoadFailed {
                name: "<process>".to_string(),
                reason: format!("error code {}", GetLastError()),
            })
        }
    }

    /// Address of `name`, or `MissingSymbol`
    pub fn symbol(&self, name: &str) -> Result<usize, LinkError> {
        let cname =
            CString::new(name).map_err(|_| LinkError::InvalidSymbolName(name.to_string()))?;
        let address = self.symbol_impl(&cname);
        if address == 0 {
            log_symbol_missing(name);
            Err(LinkError::MissingSymbol(name.to_string()))
        } else {
            log_symbol_resolved(name, address);
            Ok(address)
        }
    }

    #[cfg(unix)]
    fn symbol_impl(&self, name: &CString) -> usize {
        unsafe { libc::dlsym(self.handle.as_ptr(), name.as_ptr()) as usize }
    }

    #[cfg(windows)]
    fn symbol_impl(&self, name: &CString) -> usize {
        use winapi::shared::minwindef::HMODULE;
        use winapi::um::libloaderapi::GetProcAddress;

        unsafe { GetProcAddress(self.handle.as_ptr() as HMODULE, name.as_ptr()) as usize }
    }
}

#[cfg(unix)]
fn dl_error() -> String {
    let err = unsafe { libc::dlerror() };
    if err.is_null() {
        "unknown error".into()
    } else {
        unsafe { std::ffi::CStr::from_ptr(err) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for Library {
    #[cfg(unix)]
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                libc::dlclose(self.handle.as_ptr());
            }
        }
    }

    #[cfg(windows)]
    fn drop(&mut self) {
        use winapi::shared::minwindef::HMODULE;
        use winapi::um::libloaderapi::FreeLibrary;

        if self.owned {
            unsafe {
                FreeLibrary(self.handle.as_ptr() as HMODULE);
            }
        }
    }
}

unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl core::fmt::Debug for Library {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Library").field("name", &self.name).finish()
    }
}
