//! Symbol linker: binds declarations to resolved native symbols

use super::cif::CallInterface;
use super::closure::NativeFunction;
use super::library::Library;
use crate::error::{InvocationError, LinkError};
use crate::logging::perf;
use crate::memory::Value;
use crate::types::TypeDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A native function to bind: symbol name plus C signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub symbol: String,
    pub params: Vec<TypeDescriptor>,
    pub ret: TypeDescriptor,
}

impl Declaration {
    pub fn new(symbol: impl Into<String>, params: Vec<TypeDescriptor>, ret: TypeDescriptor) -> Self {
        Self {
            symbol: symbol.into(),
            params,
            ret,
        }
    }
}

/// A resolved symbol ready to be called
///
/// Calling a binding after its library was unloaded is undefined behaviour.
#[derive(Debug, Clone)]
pub struct NativeBinding {
    symbol: String,
    function: NativeFunction,
}

impl NativeBinding {
    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.function.address()
    }

    #[inline]
    pub fn interface(&self) -> &Arc<CallInterface> {
        self.function.interface()
    }

    /// Function pointer view of the binding
    #[inline]
    pub fn function(&self) -> &NativeFunction {
        &self.function
    }

    /// Invoke the bound symbol
    ///
    /// # Safety
    /// The declaration must match the symbol's real C signature and the
    /// library must still be loaded.
    pub unsafe fn call(&self, args: &[Value]) -> Result<Value, InvocationError> {
        self.function.call(args)
    }
}

/// How a batch reacts to missing symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkPolicy {
    /// Stop at the first missing symbol
    #[default]
    FailFast,
    /// Resolve the whole batch and report every missing symbol
    ReportAll,
}

/// Result of a partial bind
#[derive(Debug, Default)]
pub struct LinkReport {
    pub bindings: Vec<NativeBinding>,
    /// Symbols that failed to resolve, in declaration order
    pub missing: Vec<String>,
}

impl LinkReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A library together with the bindings resolved from it
pub struct LinkedModule {
    bindings: HashMap<String, NativeBinding>,
    library: Library,
}

impl LinkedModule {
    pub fn get(&self, symbol: &str) -> Option<&NativeBinding> {
        self.bindings.get(symbol)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &NativeBinding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn library(&self) -> &Library {
        &self.library
    }
}

impl core::fmt::Debug for LinkedModule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinkedModule")
            .field("library", &self.library.name())
            .field("symbols", &self.bindings.len())
            .finish()
    }
}

/// Resolves declarations against loaded libraries
#[derive(Debug, Clone, Default)]
pub struct Linker {
    policy: LinkPolicy,
    search_paths: Vec<PathBuf>,
}

impl Linker {
    pub fn new(policy: LinkPolicy) -> Self {
        Self {
            policy,
            search_paths: Vec::new(),
        }
    }

    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths.extend(paths);
        self
    }

    #[inline]
    pub fn policy(&self) -> LinkPolicy {
        self.policy
    }

    #[inline]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Bind every declaration or fail
    ///
    /// Under `FailFast` the first missing symbol is returned as
    /// `MissingSymbol`; under `ReportAll` every missing symbol is collected
    /// into `MissingSymbols`.
    pub fn bind(
        &self,
        library: &Library,
        declarations: &[Declaration],
    ) -> Result<Vec<NativeBinding>, LinkError> {
        match self.policy {
            LinkPolicy::FailFast => declarations
                .iter()
                .map(|decl| resolve(library, decl))
                .collect(),
            LinkPolicy::ReportAll => {
                let report = self.bind_available(library, declarations);
                if report.is_complete() {
                    Ok(report.bindings)
                } else {
                    Err(LinkError::MissingSymbols(report.missing))
                }
            }
        }
    }

    /// Bind whatever resolves and list the rest
    pub fn bind_available(&self, library: &Library, declarations: &[Declaration]) -> LinkReport {
        let mut report = LinkReport::default();
        for decl in declarations {
            match resolve(library, decl) {
                Ok(binding) => report.bindings.push(binding),
                Err(_) => report.missing.push(decl.symbol.clone()),
            }
        }
        report
    }

    /// Open `path` (consulting the search paths) and bind `declarations`
    pub fn link(
        &self,
        path: impl AsRef<Path>,
        declarations: &[Declaration],
    ) -> Result<LinkedModule, LinkError> {
        let _guard = perf::track("link");
        let path = path.as_ref();
        let library = if path.is_absolute() {
            Library::open(path)?
        } else {
            Library::open_in(&path.to_string_lossy(), &self.search_paths)?
        };
        let bindings = self.bind(&library, declarations)?;
        Ok(LinkedModule {
            bindings: bindings
                .into_iter()
                .map(|b| (b.symbol.clone(), b))
                .collect(),
            library,
        })
    }
}

fn resolve(library: &Library, decl: &Declaration) -> Result<NativeBinding, LinkError> {
    let address = library.symbol(&decl.symbol)?;
    let interface = CallInterface::build(decl.params.clone(), decl.ret.clone());
    Ok(NativeBinding {
        symbol: decl.symbol.clone(),
        function: NativeFunction::from_address(address, interface),
    })
}
