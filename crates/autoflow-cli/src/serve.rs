//! Subcommand: `autoflow serve`, the HTTP API plus the trigger scheduler.

use anyhow::{Context, Result};
use tracing::info;

use autoflow_runtime::AppConfig;
use autoflow_web::WebServer;

use crate::helpers::build_service;

pub async fn cmd_serve(mut config: AppConfig, bind: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(bind) = bind {
        config.web.bind = bind;
    }
    if let Some(port) = port {
        config.web.port = port;
    }
    let web_config = config.web.clone();

    let service = build_service(config).await?;
    service
        .start_scheduler()
        .await
        .context("failed to start scheduler")?;

    let server = WebServer::new(web_config, service.clone());
    println!("  autoflow listening on http://{}", server.addr());

    let result = server
        .start(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
            }
        })
        .await;

    service.shutdown().await;
    result.context("web server failed")
}
