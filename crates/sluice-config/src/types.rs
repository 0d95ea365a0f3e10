//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [logging]
//! filter = "info"          # EnvFilter directive for the console
//! file = true              # also write daily-rolling JSON logs
//! log_dir = "/var/log/sluice"
//!
//! [resolver]
//! status_prefix = "tasks."
//! status_suffix = ".status"
//! succeeded_status = "Succeeded"
//!
//! [output]
//! format = "yaml"          # yaml | json | toml
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SluiceConfig {
    pub logging: Option<LoggingConfig>,
    pub resolver: Option<ResolverConfig>,
    pub output: Option<OutputConfig>,
}

impl SluiceConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole.
    pub fn merge(&mut self, other: SluiceConfig) {
        if other.logging.is_some() {
            self.logging = other.logging;
        }
        if other.resolver.is_some() {
            self.resolver = other.resolver;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
    }

    /// Effective logging settings.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Effective resolver settings.
    pub fn resolver(&self) -> ResolverConfig {
        self.resolver.clone().unwrap_or_default()
    }

    /// Effective output settings.
    pub fn output(&self) -> OutputConfig {
        self.output.clone().unwrap_or_default()
    }

    fn validate(&self) -> crate::Result<()> {
        if let Some(resolver) = &self.resolver
            && resolver.succeeded_status.is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "resolver.succeeded_status".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console filter directive, overridden by `RUST_LOG`.
    pub filter: String,
    /// Write daily-rolling JSON log files.
    pub file: bool,
    /// Directory for log files. Defaults to the user config dir's `logs/`.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file: false,
            log_dir: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Status-key convention the result aggregator reads completion statuses
/// with: `<status_prefix><task><status_suffix>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub status_prefix: String,
    pub status_suffix: String,
    pub succeeded_status: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            status_prefix: "tasks.".to_string(),
            status_suffix: ".status".to_string(),
            succeeded_status: "Succeeded".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

/// Document format for printed specs and results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Yaml => write!(f, "yaml"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Toml => write!(f, "toml"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            "toml" => Ok(OutputFormat::Toml),
            other => Err(ConfigError::InvalidValue {
                field: "output.format".to_string(),
                reason: format!("unknown format '{other}'"),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
