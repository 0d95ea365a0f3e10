//! Sluice - resolve pipeline variables and aggregate run results
//!
//! Main entry point for the Sluice CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, resolve, results};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Sluice - resolve pipeline variables and aggregate run results
#[derive(Parser)]
#[command(name = "sluice")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// User config directory (default: platform config dir)
    #[arg(long, global = true, env = "SLUICE_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a pipeline's variables against a run
    Resolve(resolve::ResolveArgs),

    /// Aggregate a pipeline's declared results from a run outcome
    Results(results::ResultsArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = sluice_config::load_config_with_options(None, cli.config_dir.as_deref())?;
    let logging = loaded.config.logging();

    // RUST_LOG wins over both the flag and the configured filter.
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "sluice=debug,sluice_pipeline=debug,sluice_config=debug,info".to_string()
        } else {
            logging.filter.clone()
        }
    });

    use tracing_subscriber::prelude::*;
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(tracing_subscriber::EnvFilter::new(filter));

    let mut _guard = None;
    let file = if logging.file {
        let log_dir = logging
            .log_dir
            .clone()
            .or_else(|| {
                cli.config_dir
                    .clone()
                    .or_else(sluice_config::xdg_config_dir)
                    .map(|d| d.join("logs"))
            })
            .unwrap_or_else(|| PathBuf::from("logs"));
        let file_appender = tracing_appender::rolling::daily(&log_dir, "sluice.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = Some(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "sluice=trace,sluice_pipeline=trace,sluice_config=trace,info",
                )),
        )
    } else {
        None
    };

    tracing_subscriber::registry().with(console).with(file).init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config_dir: cli.config_dir,
        config: loaded.config,
    };

    match cli.command {
        Commands::Resolve(args) => resolve::run(args, &ctx),
        Commands::Results(args) => results::run(args, &ctx),
        Commands::Config(args) => config::run(args, &ctx),
    }
}
