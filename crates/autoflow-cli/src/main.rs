//! CLI entry point for autoflow.
//!
//! This binary provides the `autoflow` command: an interactive REPL, the
//! HTTP server with the trigger scheduler, and a few inspection commands.

mod cli;
mod commands;
mod helpers;
mod repl;
mod serve;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::helpers::{init_tracing, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Run { .. } | Commands::Status | Commands::Templates => "warn",
        Commands::Serve { .. } | Commands::Fire { .. } => "info",
    };
    init_tracing(default_level, cli.log_json);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            agent,
            session,
            with_scheduler,
        } => repl::cmd_run(config, agent, session, with_scheduler).await,
        Commands::Serve { bind, port } => serve::cmd_serve(config, bind, port).await,
        Commands::Status => commands::cmd_status(&config),
        Commands::Templates => commands::cmd_templates(&config),
        Commands::Fire { trigger_id } => commands::cmd_fire(config, trigger_id).await,
    }
}
