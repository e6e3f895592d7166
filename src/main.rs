//! GEPA CLI entry point.

use anyhow::Result;
use clap::Parser;

use gepa::cli::commands;
use gepa::cli::context::AppContext;
use gepa::cli::{handle_error, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init(args) => commands::init::execute(args, config_path, cli.json).await,
        Commands::Config(args) => commands::config::execute(args, config_path, cli.json),
        Commands::Param(args) => {
            let ctx = AppContext::bootstrap(config_path).await?;
            let result = commands::param::execute(args, &ctx, cli.json).await;
            ctx.shutdown().await;
            result
        }
        Commands::Session(args) => {
            let ctx = AppContext::bootstrap(config_path).await?;
            let result = commands::session::execute(args, &ctx, cli.json).await;
            ctx.shutdown().await;
            result
        }
    }
}
