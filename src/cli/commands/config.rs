//! Configuration command implementations

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

use crate::cli::Output;
use crate::config::{CONFIG_FILE, ENV_PREFIX, RegistryConfig};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Check the configuration without running anything
    Validate,
}

/// Execute config commands
pub fn execute(args: ConfigArgs, config_path: Option<&Path>, output: &Output) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show(config_path, output),
        ConfigCommands::Validate => validate(config_path, output),
    }
}

fn show(config_path: Option<&Path>, output: &Output) -> Result<()> {
    let config = RegistryConfig::load_from(config_path)?;
    output.plain(&config.to_toml()?);
    Ok(())
}

fn validate(config_path: Option<&Path>, output: &Output) -> Result<()> {
    let source = config_path
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| CONFIG_FILE.to_string());
    output.step(&format!("Validating {source} (with {ENV_PREFIX}* overrides)"));

    RegistryConfig::load_from(config_path)?;

    output.success("Configuration is valid");
    Ok(())
}
