//! Config command - configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let effective = sluice_config::SluiceConfig {
        logging: Some(ctx.config.logging()),
        resolver: Some(ctx.config.resolver()),
        output: Some(ctx.config.output()),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&effective)?);
        return Ok(());
    }

    println!("# Sluice Configuration\n");
    print!("{}", effective.to_toml()?);
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = sluice_config::load_config_with_options(None, ctx.config_dir.as_deref())?;

    println!("Config file search order (later overrides earlier):\n");

    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found, using defaults.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }
    for warning in &loaded.warnings {
        println!("warning: {warning}");
    }

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let path = match &ctx.config_dir {
        Some(dir) => Some(dir.join("config.toml")),
        None => sluice_config::xdg_config_path(),
    };
    match path {
        Some(path) => println!("{}", path.display()),
        None => eprintln!("Could not determine config directory"),
    }
    Ok(())
}
