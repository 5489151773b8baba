//! Shared helpers for the subcommands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use autoflow_runtime::{AppConfig, ApiResponse, AutomationService};

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber.  `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Load `.env`, then the config file and `AUTOFLOW_*` overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Ok(env_file) = dotenvy::dotenv() {
        info!(path = %env_file.display(), "loaded .env");
    }
    AppConfig::load(path).context("failed to load configuration")
}

/// Build the production service for `config`.
pub async fn build_service(config: AppConfig) -> Result<Arc<AutomationService>> {
    let service = AutomationService::from_config(config)
        .await
        .context("failed to start automation service")?;
    Ok(Arc::new(service))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Print a response for a terminal user.
pub fn print_response(response: &ApiResponse) {
    println!();
    println!("  {}", response.message.replace('\n', "\n  "));
    if let Some(result) = &response.execution_result {
        for step in &result.steps {
            let detail = step.error.as_deref().unwrap_or("");
            println!("    [{:?}] {} {}", step.status, step.step_id, detail);
        }
    }
    if let Some(id) = response.trigger_id {
        println!("    trigger: {id}");
    }
    println!();
}
