//! One-shot subcommands: `status`, `templates`, `fire`.

use anyhow::{Result, bail};
use uuid::Uuid;

use autoflow_runtime::{
    AppConfig, AutomationService, LlmProviderKind, ResponseStatus, template_catalog,
};

use crate::helpers::{build_service, print_response};

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

pub fn cmd_status(config: &AppConfig) -> Result<()> {
    println!();
    println!("  autoflow status");
    println!("  ===============");
    println!();

    if config.storage.ephemeral {
        println!("  Database:         in memory (ephemeral)");
    } else if config.storage.database_path.exists() {
        println!("  Database:         OK ({})", config.storage.database_path.display());
    } else {
        println!(
            "  Database:         NOT CREATED YET ({})",
            config.storage.database_path.display()
        );
    }

    match config.llm.provider {
        LlmProviderKind::None => println!("  Language model:   none (keyword classification)"),
        provider => {
            let key_state = if std::env::var(&config.llm.api_key_env).is_ok() {
                "key set"
            } else {
                "KEY MISSING"
            };
            println!(
                "  Language model:   {provider:?} {} ({} {key_state})",
                config.llm.model, config.llm.api_key_env
            );
        }
    }

    println!(
        "  Scheduler:        poll every {}s",
        config.scheduler.poll_interval_secs
    );
    println!(
        "  Instances:        idle TTL {}h, history {} messages",
        config.instances.idle_ttl_hours, config.instances.history_limit
    );
    println!(
        "  Execution:        {}, step timeout {}s, {} retries",
        if config.execution.continue_on_failure {
            "continue on failure"
        } else {
            "fail fast"
        },
        config.execution.step_timeout_secs,
        config.execution.max_retries
    );

    // Catalog and drivers need no storage; build them in memory.
    let probe = AutomationService::builder(config.clone())
        .catalog(template_catalog(config)?)
        .build()?;
    println!("  Templates:        {}", probe.catalog().len());
    println!("  Drivers:          {}", probe.registry().count());
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// templates
// ---------------------------------------------------------------------------

pub fn cmd_templates(config: &AppConfig) -> Result<()> {
    let catalog = template_catalog(config)?;
    println!();
    for template in catalog.iter() {
        println!(
            "  {:<22} {:<10} {}",
            template.id,
            template.category.as_str(),
            template.description
        );
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// fire
// ---------------------------------------------------------------------------

pub async fn cmd_fire(config: AppConfig, trigger_id: Uuid) -> Result<()> {
    let service = build_service(config).await?;
    let response = service.fire_trigger(trigger_id).await;
    print_response(&response);
    service.shutdown().await;
    if response.status == ResponseStatus::Error {
        bail!("trigger {trigger_id} did not run: {}", response.message);
    }
    Ok(())
}
