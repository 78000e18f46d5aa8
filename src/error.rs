//! Error taxonomy
//!
//! Layout, link and invocation failures are reported synchronously at the
//! call that triggered them. Nothing is retried: native calls and symbol
//! resolution are not idempotent in general.
//!
//! Out-of-extent access through unchecked views, ABI shape mismatches and use
//! of unloaded bindings are *not* represented here. They are native undefined
//! behaviour and are documented on the `unsafe` APIs that can cause them.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Any error produced by this crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Malformed or incomplete struct description
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("field `{field}` of struct `{strukt}` has incomplete type void")]
    IncompleteField { strukt: String, field: String },

    #[error("field `{field}` of struct `{strukt}` has cardinality 0")]
    ZeroCardinality { strukt: String, field: String },

    #[error("struct `{strukt}` declares field `{field}` more than once")]
    DuplicateField { strukt: String, field: String },

    #[error("field `{field}` of struct `{strukt}` embeds unknown struct `{target}`")]
    UnknownStruct {
        strukt: String,
        field: String,
        target: String,
    },

    #[error("struct `{strukt}` is already defined with a different field list")]
    Redefined { strukt: String },

    #[error("invalid struct description: {0}")]
    Parse(String),
}

/// Library loading and symbol resolution failures
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid library name `{0}`")]
    InvalidLibraryName(String),

    #[error("failed to load library `{name}`: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("invalid symbol name `{0}`")]
    InvalidSymbolName(String),

    #[error("symbol `{0}` not found")]
    MissingSymbol(String),

    #[error("symbols not found: {}", .0.join(", "))]
    MissingSymbols(Vec<String>),
}

impl LinkError {
    /// Names of the symbols that failed to resolve, if this is a resolution error
    pub fn missing_symbols(&self) -> Vec<&str> {
        match self {
            Self::MissingSymbol(name) | Self::InvalidSymbolName(name) => vec![name.as_str()],
            Self::MissingSymbols(names) => names.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Failures detected while setting up or performing a native call
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("call target is null (unresolved symbol?)")]
    NullTarget,

    #[error("expected {expected} arguments, got {got}")]
    ArgCountMismatch { expected: usize, got: usize },

    #[error("argument {index}: expected {expected}, found {found}")]
    ArgumentType {
        index: usize,
        expected: String,
        found: &'static str,
    },

    #[error("failed to prepare callback closure: {0}")]
    ClosurePrep(String),

    #[error("failed to stage struct return: {0}")]
    ReturnStorage(#[from] AllocError),
}

/// A managed value does not fit the view or field it is used with
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("cannot store {found} into element of type {expected}")]
    TypeMismatch { expected: String, found: &'static str },

    #[error("view of type {0} is not a struct")]
    NotAStruct(String),

    #[error("struct `{strukt}` has no field `{field}`")]
    UnknownField { strukt: String, field: String },

    #[error("cannot write through a pointer-to-pointer cast")]
    ReadOnlyIndirection,

    #[error("access of {size} bytes at {address:#x} is outside the backing buffer")]
    OutOfExtent { address: usize, size: usize },
}

/// Explicit allocation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("cannot allocate zero length array")]
    ZeroLength,

    #[error("allocation of {0} bytes failed")]
    OutOfMemory(usize),

    #[error("allocation size overflows: {nmemb} x {size}")]
    Overflow { nmemb: usize, size: usize },
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
