//! Router composition and startup.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use autoflow_runtime::{AutomationService, WebConfig};

use crate::api;
use crate::error::WebError;
use crate::state::AppState;

/// The autoflow HTTP server.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: WebConfig, service: Arc<AutomationService>) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new(service)),
        }
    }

    /// The `host:port` string this server binds to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind, self.config.port)
    }

    /// The axum router with every route registered.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any);

        Router::new()
            .route("/api/health", get(api::health))
            .route("/api/templates", get(api::templates))
            // Instances.
            .route("/api/instances", get(api::list_instances))
            .route("/api/instances", post(api::create_instance))
            .route(
                "/api/instances/{agent_id}/{session_id}",
                delete(api::remove_instance),
            )
            .route(
                "/api/instances/{agent_id}/{session_id}/messages",
                post(api::send_message),
            )
            // Triggers.
            .route("/api/triggers", post(api::create_trigger))
            .route("/api/agents/{agent_id}/triggers", get(api::list_triggers))
            .route("/api/triggers/{trigger_id}/fire", post(api::fire_trigger))
            .route("/api/triggers/{trigger_id}/pause", post(api::pause_trigger))
            .route("/api/triggers/{trigger_id}/resume", post(api::resume_trigger))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), WebError> {
        let addr = self.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| WebError::Bind {
                addr: addr.clone(),
                source,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), WebError> {
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, "starting web server");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("web server stopped");
        Ok(())
    }
}
