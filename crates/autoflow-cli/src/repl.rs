//! Subcommand: `autoflow run`, an interactive REPL over one agent instance.

use std::io::{self, Write as _};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use autoflow_runtime::AppConfig;

use crate::helpers::{build_service, print_response};

/// Run the interactive REPL.
pub async fn cmd_run(
    config: AppConfig,
    agent_id: String,
    session_id: String,
    with_scheduler: bool,
) -> Result<()> {
    let service = build_service(config).await?;
    if with_scheduler {
        service
            .start_scheduler()
            .await
            .context("failed to start scheduler")?;
    }
    info!(agent_id, session_id, "repl started");

    println!();
    println!("  autoflow v{}", env!("CARGO_PKG_VERSION"));
    println!("  Describe what to automate, or type 'quit' to exit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            break;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            break;
        }
        if trimmed == "status" {
            let listing = service.list_instances_status();
            let pretty = serde_json::to_string_pretty(&listing.data).unwrap_or_default();
            println!("{pretty}");
            continue;
        }

        let response = service.send_message(&agent_id, &session_id, trimmed).await;
        print_response(&response);
    }

    service.shutdown().await;
    info!("repl closed");
    Ok(())
}
