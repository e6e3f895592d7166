//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::config::ConfigArgs;
use super::commands::init::InitArgs;
use super::commands::param::ParamArgs;
use super::commands::session::SessionArgs;

#[derive(Parser, Debug)]
#[command(name = "gepa")]
#[command(about = "GEPA - genetic-evolutionary prompt optimizer", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Additional configuration file, merged over .gepa/config.yaml
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration and database
    Init(InitArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Prompt parameter registry
    Param(ParamArgs),

    /// Optimization sessions
    Session(SessionArgs),
}
