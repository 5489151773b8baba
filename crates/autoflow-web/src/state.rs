//! Shared application state for the web server.

use std::sync::Arc;
use std::time::Instant;

use autoflow_runtime::AutomationService;

/// Shared state accessible from every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AutomationService>,
    /// When the server was built, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<AutomationService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}
