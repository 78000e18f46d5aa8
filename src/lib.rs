//! abicall - call C from Rust without generated bindings
//!
//! Architecture:
//! - `types` / `layout` - C type descriptors and struct layout under C ABI rules
//! - `memory` - typed views over native memory (`Pointer`) and managed values
//! - `interop` - libffi call interfaces, dispatch, callbacks and the symbol linker
//! - `decl` - struct descriptions read from TOML
//! - `config` / `logging` / `error` - ambient configuration, tracing and errors

pub mod config;
pub mod decl;
pub mod error;
pub mod interop;
pub mod layout;
pub mod logging;
pub mod memory;
pub mod types;

pub use config::Config;
pub use decl::DeclSet;
pub use error::{
    AllocError, ConfigError, Error, InvocationError, LayoutError, LinkError, Result, ValueError,
};
pub use interop::{
    wrap, Callable, CallInterface, Declaration, FunctionCall, Library, LinkPolicy, LinkedModule,
    Linker, NativeBinding, NativeFunction,
};
pub use layout::{registry, FieldSpec, LayoutRegistry, StructLayout};
pub use memory::{Handler, Pointer, Scalar, Value};
pub use types::{IntWidth, TypeDescriptor};

/// Load `abicall.toml` (if any), apply environment overrides and start logging
pub fn init() -> Config {
    let config = Config::discover().apply_env();
    init_with_config(&config);
    config
}

/// Start logging as described by `config`
pub fn init_with_config(config: &Config) {
    logging::init_with_config(config.logging.to_log_config());
    tracing::debug!(policy = ?config.linker.policy, "abicall initialized");
}
