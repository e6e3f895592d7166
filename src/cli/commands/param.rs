//! Prompt parameter CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::errors::OptimizationError;
use crate::domain::models::PromptParameter;

#[derive(Args, Debug)]
pub struct ParamArgs {
    #[command(subcommand)]
    pub command: ParamCommands,
}

#[derive(Subcommand, Debug)]
pub enum ParamCommands {
    /// Register a prompt parameter of a module
    Add {
        /// Module that owns the parameter
        #[arg(short, long)]
        module: String,
        /// Parameter name, unique within the module
        #[arg(short, long)]
        name: String,
        /// Initial prompt text
        #[arg(short, long, conflicts_with = "prompt_file", required_unless_present = "prompt_file")]
        prompt: Option<String>,
        /// Read the initial prompt from a file
        #[arg(long)]
        prompt_file: Option<PathBuf>,
    },
    /// List a module's prompt parameters
    List {
        /// Module id
        #[arg(short, long)]
        module: String,
    },
    /// Show a prompt parameter
    Show {
        /// Parameter ID
        id: Uuid,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct ParamOutput {
    pub parameter: PromptParameter,
}

impl CommandOutput for ParamOutput {
    fn to_human(&self) -> String {
        let p = &self.parameter;
        let mut lines = vec![
            format!("Parameter: {}", p.name),
            format!("ID: {}", p.id),
            format!("Module: {}", p.module_id),
            format!("Updated: {}", p.updated_at.format("%Y-%m-%d %H:%M:%S UTC")),
            "\nInitial prompt:".to_string(),
            p.initial_prompt.clone(),
        ];
        if let Some(final_prompt) = &p.final_prompt {
            lines.push("\nOptimized prompt:".to_string());
            lines.push(final_prompt.clone());
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ParamListOutput {
    pub parameters: Vec<PromptParameter>,
    pub total: usize,
}

impl CommandOutput for ParamListOutput {
    fn to_human(&self) -> String {
        if self.parameters.is_empty() {
            return "No prompt parameters found.".to_string();
        }
        format!(
            "{}\n\nShowing {} parameter(s)",
            TableFormatter::new().format_parameters(&self.parameters),
            self.total
        )
    }
}

pub async fn execute(args: ParamArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let service = &ctx.service;

    match args.command {
        ParamCommands::Add {
            module,
            name,
            prompt,
            prompt_file,
        } => {
            let initial_prompt = match (prompt, prompt_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read prompt file {}", path.display()))?,
                (None, None) => anyhow::bail!("either --prompt or --prompt-file is required"),
            };

            let parameter = service
                .register_prompt_parameter(&module, &name, &initial_prompt)
                .await
                .context("Failed to register prompt parameter")?;
            output(&ParamOutput { parameter }, json_mode);
        }

        ParamCommands::List { module } => {
            let parameters = service
                .list_prompt_parameters(&module)
                .await
                .context("Failed to list prompt parameters")?;
            let out = ParamListOutput {
                total: parameters.len(),
                parameters,
            };
            output(&out, json_mode);
        }

        ParamCommands::Show { id } => {
            let parameter = service
                .get_prompt_parameter(id)
                .await?
                .ok_or(OptimizationError::ParameterNotFound(id))?;
            output(&ParamOutput { parameter }, json_mode);
        }
    }

    Ok(())
}
