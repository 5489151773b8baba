//! CLI argument definitions for autoflow.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// autoflow -- natural-language workflow automation.
#[derive(Parser)]
#[command(
    name = "autoflow",
    version,
    about = "autoflow -- natural-language workflow automation",
    long_about = "Turns requests like \"send a welcome email to ops@example.com\" into \
                  validated workflows, runs them, and fires stored workflows on triggers."
)]
pub struct Cli {
    /// Config file (defaults to config/default.toml when present).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chat with one agent instance in the terminal.
    Run {
        /// Agent id for the instance.
        #[arg(long, default_value = "cli")]
        agent: String,

        /// Session id for the instance.
        #[arg(long, short, default_value = "local")]
        session: String,

        /// Also run the trigger scheduler while the REPL is open.
        #[arg(long)]
        with_scheduler: bool,
    },

    /// Start the HTTP API and the trigger scheduler.
    Serve {
        /// Address to bind (overrides `[web] bind`).
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (overrides `[web] port`).
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Show the effective configuration and what it resolves to.
    Status,

    /// List the template catalog.
    Templates,

    /// Fire a stored trigger once and print the result.
    Fire {
        /// The trigger to fire.
        trigger_id: Uuid,
    },
}
