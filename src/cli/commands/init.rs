//! Implementation of the `gepa init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use crate::cli::context::init_logging;
use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::setup::{initialize, SetupPaths};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long, short)]
    pub force: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub config_file: PathBuf,
    pub config_written: bool,
    pub database_path: PathBuf,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if self.config_written {
            lines.push(format!("Wrote default configuration to {}", self.config_file.display()));
        } else {
            lines.push(format!(
                "Kept existing configuration at {} (use --force to overwrite)",
                self.config_file.display()
            ));
        }
        lines.push(format!("Database ready at {}", self.database_path.display()));
        lines.join("\n")
    }
}

pub async fn execute(args: InitArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load(config_path).context("Failed to load configuration")?;
    let _logger = init_logging(&config)?;

    let paths = SetupPaths::new()?;
    let database_path = PathBuf::from(&config.database.path);
    let report = initialize(&paths, &database_path, args.force)
        .await
        .context("Failed to initialize project")?;

    let out = InitOutput {
        success: true,
        message: "Project initialized successfully.".to_string(),
        config_file: report.config_file,
        config_written: report.config_written,
        database_path: report.database_path,
    };
    output(&out, json_mode);
    Ok(())
}
