//! Configuration CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::Path;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Check the configuration without running anything
    Validate,
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigOutput {
    #[serde(flatten)]
    pub config: Config,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_else(|e| format!("failed to render configuration: {e}"))
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ValidateOutput {
    pub valid: bool,
    pub message: String,
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

/// Copy of the configuration safe to print.
fn redacted(mut config: Config) -> Config {
    if config.reflection.api_key.is_some() {
        config.reflection.api_key = Some("********".to_string());
    }
    config
}

pub fn execute(args: ConfigArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load(config_path).context("Failed to load configuration")?;

    match args.command {
        ConfigCommands::Show => {
            let out = ConfigOutput {
                config: redacted(config),
            };
            output(&out, json_mode);
        }
        ConfigCommands::Validate => {
            let out = ValidateOutput {
                valid: true,
                message: "Configuration is valid.".to_string(),
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}
