//! HTTP interface for autoflow.
//!
//! A thin axum layer over [`autoflow_runtime::AutomationService`]: every
//! route deserialises its input, calls one service operation, and returns
//! the service's `ApiResponse` as JSON.

pub mod api;
pub mod error;
pub mod server;
pub mod state;

pub use error::WebError;
pub use server::WebServer;
pub use state::AppState;
