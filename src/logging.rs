//! Logging infrastructure - structured tracing for layout, memory and calls
//!
//! Design: Uses `tracing` with:
//! - Configurable level, format and destination
//! - Zero-cost when disabled
//! - Fixed event targets (`layout`, `memory`, `ffi`, `callback`, `linker`)
//!   so hot paths can be filtered independently

use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    filter::Directive,
    EnvFilter, Layer,
};

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn};

/// Global logging state; holds the non-blocking writer guard for process lifetime
static LOGGER: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line
    Pretty,
    /// Single line per event
    Compact,
    /// Structured JSON
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily rotated file
    File { directory: PathBuf, prefix: String },
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span open/close events
    pub span_events: bool,
    /// Extra filter directives (e.g. "abicall::ffi=trace")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Default config overridden by environment variables
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Apply environment overrides on top of this config
    ///
    /// - `ABICALL_LOG_LEVEL`: trace, debug, info, warn, error
    /// - `ABICALL_LOG_FORMAT`: pretty, compact, json
    /// - `ABICALL_LOG_DIR`: write rotated log files into this directory
    /// - `ABICALL_LOG_SPANS`: show span events
    pub fn apply_env(mut self) -> Self {
        if let Ok(level) = std::env::var("ABICALL_LOG_LEVEL") {
            if let Some(level) = parse_level(&level) {
                self.level = level;
            }
        }
        if let Ok(format) = std::env::var("ABICALL_LOG_FORMAT") {
            if let Some(format) = parse_format(&format) {
                self.format = format;
            }
        }
        if let Ok(dir) = std::env::var("ABICALL_LOG_DIR") {
            self.output = LogOutput::File {
                directory: PathBuf::from(dir),
                prefix: "abicall".to_string(),
            };
        }
        if std::env::var("ABICALL_LOG_SPANS").is_ok() {
            self.span_events = true;
        }
        self
    }

    /// Verbose config for debugging native interop
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            format: LogFormat::Pretty,
            output: LogOutput::Stderr,
            span_events: true,
            filter: None,
        }
    }
}

/// Parse a level name, case-insensitively
pub fn parse_level(value: &str) -> Option<Level> {
    match value.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Parse a format name, case-insensitively
pub fn parse_format(value: &str) -> Option<LogFormat> {
    match value.to_lowercase().as_str() {
        "pretty" => Some(LogFormat::Pretty),
        "compact" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

/// Initialize logging from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with a custom configuration
///
/// Only the first call has an effect. If another subscriber is already
/// installed globally it is left in place.
pub fn init_with_config(config: LogConfig) {
    LOGGER.get_or_init(|| {
        let filter = build_filter(&config);
        let (writer, guard) = match &config.output {
            LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
            LogOutput::File { directory, prefix } => {
                tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, prefix))
            }
        };

        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_span_events(span_events_config(config.span_events));

        let layer = match config.format {
            LogFormat::Pretty => layer.pretty().with_filter(filter).boxed(),
            LogFormat::Compact => layer.compact().with_filter(filter).boxed(),
            LogFormat::Json => layer.json().with_filter(filter).boxed(),
        };

        match tracing_subscriber::registry().with(layer).try_init() {
            Ok(()) => Some(guard),
            Err(_) => None,
        }
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("abicall={}", config.level.as_str().to_lowercase())));

    match &config.filter {
        Some(directives) => directives
            .split(',')
            .filter(|d| !d.trim().is_empty())
            .fold(base, |filter, directive| match directive.trim().parse::<Directive>() {
                Ok(directive) => filter.add_directive(directive),
                Err(_) => {
                    warn!("Invalid filter directive: {}", directive);
                    filter
                }
            }),
        None => base,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

// ============================================================================
// Event helpers
// ============================================================================

/// Log a computed struct layout
#[inline]
pub fn log_layout_computed(name: &str, size: usize, align: usize) {
    debug!(target: "abicall::layout", name, size, align, "struct layout computed");
}

/// Log a built call interface
#[inline]
pub fn log_interface_built(signature: &str, arg_count: usize) {
    debug!(target: "abicall::ffi", signature, arg_count, "call interface built");
}

/// Log an explicit native allocation
#[inline]
pub fn log_allocation(size: usize, address: usize) {
    trace!(target: "abicall::memory", size, address, "allocated native memory");
}

/// Log release of an explicit native allocation
#[inline]
pub fn log_deallocation(address: usize) {
    trace!(target: "abicall::memory", address, "released native memory");
}

/// Log a native call
#[inline]
pub fn log_ffi_call(address: usize, arg_count: usize) {
    trace!(target: "abicall::ffi", address, arg_count, "native call");
}

/// Log a native call return
#[inline]
pub fn log_ffi_return(address: usize) {
    trace!(target: "abicall::ffi", address, "native call returned");
}

/// Log a native-to-managed callback entry
#[inline]
pub fn log_callback(code: usize, arg_count: usize) {
    trace!(target: "abicall::callback", code, arg_count, "callback invoked");
}

/// Log a loaded library
#[inline]
pub fn log_library_loaded(name: &str) {
    info!(target: "abicall::linker", library = name, "library loaded");
}

/// Log a resolved symbol
#[inline]
pub fn log_symbol_resolved(symbol: &str, address: usize) {
    debug!(target: "abicall::linker", symbol, address, "symbol resolved");
}

/// Log a symbol that failed to resolve
#[inline]
pub fn log_symbol_missing(symbol: &str) {
    warn!(target: "abicall::linker", symbol, "symbol not found");
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            debug!(
                operation = self.operation,
                duration_us = self.start.elapsed().as_micros() as u64,
                "operation completed"
            );
        }
    }
}
