//! Configuration from `abicall.toml`
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "json"
//! directory = "/var/log/abicall"
//! spans = true
//! filter = "abicall::ffi=trace"
//!
//! [linker]
//! policy = "report-all"
//! search_paths = ["/opt/native/lib"]
//! ```

use crate::error::ConfigError;
use crate::interop::LinkPolicy;
use crate::logging::{parse_level, LogConfig, LogFormat, LogOutput};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name searched for by [`Config::discover`]
pub const CONFIG_FILE: &str = "abicall.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub linker: LinkerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: FormatName,

    /// Write daily rotated files here instead of stderr
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_false")]
    pub spans: bool,

    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatName {
    Pretty,
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkerConfig {
    #[serde(default)]
    pub policy: LinkPolicy,

    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: FormatName::default(),
            directory: None,
            spans: false,
            filter: None,
        }
    }
}

fn default_level() -> String { "info".to_string() }
fn default_false() -> bool { false }

impl From<FormatName> for LogFormat {
    fn from(name: FormatName) -> Self {
        match name {
            FormatName::Pretty => LogFormat::Pretty,
            FormatName::Compact => LogFormat::Compact,
            FormatName::Json => LogFormat::Json,
        }
    }
}

impl LoggingSection {
    /// Logging configuration described by this section
    ///
    /// An unknown level name falls back to `info`.
    pub fn to_log_config(&self) -> LogConfig {
        let mut config = LogConfig::new()
            .with_format(self.format.into())
            .with_span_events(self.spans);
        if let Some(level) = parse_level(&self.level) {
            config = config.with_level(level);
        }
        if let Some(directory) = &self.directory {
            config = config.with_output(LogOutput::File {
                directory: directory.clone(),
                prefix: "abicall".to_string(),
            });
        }
        if let Some(filter) = &self.filter {
            config = config.with_filter(filter.clone());
        }
        config
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Find and load `abicall.toml` from the current directory or its parents
    ///
    /// Falls back to defaults when no readable file is found.
    pub fn discover() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|dir| Self::discover_from(&dir))
            .unwrap_or_default()
    }

    /// Walk from `start` upward looking for `abicall.toml`
    pub fn discover_from(start: &Path) -> Option<Self> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .filter(|path| path.is_file())
            .find_map(|path| Self::load(&path).ok())
    }

    /// Apply environment overrides
    ///
    /// - `ABICALL_LOG_LEVEL`, `ABICALL_LOG_FORMAT`, `ABICALL_LOG_DIR`,
    ///   `ABICALL_LOG_SPANS`: as for [`LogConfig::from_env`]
    /// - `ABICALL_LINK_POLICY`: `fail-fast` or `report-all`
    /// - `ABICALL_LIBRARY_PATH`: extra search paths, platform path-list syntax
    pub fn apply_env(mut self) -> Self {
        if let Ok(level) = std::env::var("ABICALL_LOG_LEVEL") {
            if parse_level(&level).is_some() {
                self.logging.level = level.to_lowercase();
            }
        }
        if let Ok(format) = std::env::var("ABICALL_LOG_FORMAT") {
            match format.to_lowercase().as_str() {
                "pretty" => self.logging.format = FormatName::Pretty,
                "compact" => self.logging.format = FormatName::Compact,
                "json" => self.logging.format = FormatName::Json,
                _ => {}
            }
        }
        if let Ok(dir) = std::env::var("ABICALL_LOG_DIR") {
            self.logging.directory = Some(PathBuf::from(dir));
        }
        if std::env::var("ABICALL_LOG_SPANS").is_ok() {
            self.logging.spans = true;
        }
        if let Ok(policy) = std::env::var("ABICALL_LINK_POLICY") {
            match policy.to_lowercase().as_str() {
                "fail-fast" => self.linker.policy = LinkPolicy::FailFast,
                "report-all" => self.linker.policy = LinkPolicy::ReportAll,
                _ => {}
            }
        }
        if let Some(paths) = std::env::var_os("ABICALL_LIBRARY_PATH") {
            self.linker.search_paths.extend(std::env::split_paths(&paths));
        }
        self
    }

    /// Linker configured by the `[linker]` section
    pub fn linker(&self) -> crate::interop::Linker {
        crate::interop::Linker::new(self.linker.policy)
            .with_search_paths(self.linker.search_paths.iter().cloned())
    }
}
