//! CLI command handlers.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use sluice_config::{OutputFormat, SluiceConfig};

pub mod config;
pub mod resolve;
pub mod results;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// User config directory override.
    pub config_dir: Option<PathBuf>,
    /// Merged configuration.
    pub config: SluiceConfig,
}

impl Context {
    /// Output format for documents: `--json` first, then the command's
    /// `--format`, then the configured default.
    pub fn output_format(&self, requested: Option<OutputFormat>) -> OutputFormat {
        if self.json_output {
            return OutputFormat::Json;
        }
        requested.unwrap_or_else(|| self.config.output().format)
    }
}

/// Render a document in the given format.
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Toml => toml::to_string_pretty(value)?,
    };
    Ok(text)
}
