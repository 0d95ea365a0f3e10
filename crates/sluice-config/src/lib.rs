//! Configuration for the Sluice CLI.
//!
//! Provides TOML-based configuration with:
//! - Logging filter and optional JSON file logging (`[logging]`)
//! - The status-key convention used when aggregating results (`[resolver]`)
//! - Default output document format (`[output]`)
//!
//! Files are layered: the user config dir first, then `./sluice.toml`.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, PROJECT_CONFIG_FILE, load_config, load_config_file,
    load_config_with_options, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
