//! REST API route handlers.
//!
//! Each handler maps one request onto one `AutomationService` call.  The
//! body is always the service's `ApiResponse`; the HTTP status mirrors its
//! `status` field.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use autoflow_runtime::{ApiResponse, ResponseStatus};

use crate::state::AppState;

type Reply = (StatusCode, Json<ApiResponse>);

/// HTTP status for a service response.
pub fn http_status(response: &ApiResponse) -> StatusCode {
    match response.status {
        ResponseStatus::Busy => StatusCode::CONFLICT,
        ResponseStatus::Error => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    }
}

fn reply(response: ApiResponse) -> Reply {
    (http_status(&response), Json(response))
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub instances: usize,
    pub templates: usize,
    pub drivers: usize,
    pub scheduler_running: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let service = &state.service;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        instances: service.instances().len(),
        templates: service.catalog().len(),
        drivers: service.registry().count(),
        scheduler_running: service.scheduler().is_running(),
    })
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateInstanceBody {
    pub agent_id: String,
    pub session_id: String,
    #[serde(default)]
    pub init_data: Value,
}

/// POST /api/instances
pub async fn create_instance(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateInstanceBody>,
) -> Reply {
    reply(
        state
            .service
            .create_instance(&body.agent_id, &body.session_id, body.init_data),
    )
}

/// GET /api/instances
pub async fn list_instances(State(state): State<Arc<AppState>>) -> Reply {
    reply(state.service.list_instances_status())
}

/// DELETE /api/instances/{agent_id}/{session_id}
pub async fn remove_instance(
    State(state): State<Arc<AppState>>,
    Path((agent_id, session_id)): Path<(String, String)>,
) -> Reply {
    let response = state.service.remove_instance(&agent_id, &session_id);
    if response.status == ResponseStatus::Error {
        return (StatusCode::NOT_FOUND, Json(response));
    }
    reply(response)
}

#[derive(Deserialize)]
pub struct MessageBody {
    pub message: String,
}

/// POST /api/instances/{agent_id}/{session_id}/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path((agent_id, session_id)): Path<(String, String)>,
    Json(body): Json<MessageBody>,
) -> Reply {
    reply(
        state
            .service
            .send_message(&agent_id, &session_id, &body.message)
            .await,
    )
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateTriggerBody {
    pub agent_id: String,
    pub workflow_id: Uuid,
    pub trigger_type: String,
    #[serde(default)]
    pub config: Value,
}

/// POST /api/triggers
pub async fn create_trigger(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTriggerBody>,
) -> Reply {
    reply(
        state
            .service
            .create_trigger(&body.agent_id, body.workflow_id, &body.trigger_type, body.config)
            .await,
    )
}

/// GET /api/agents/{agent_id}/triggers
pub async fn list_triggers(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Reply {
    reply(state.service.list_triggers(&agent_id).await)
}

/// POST /api/triggers/{trigger_id}/fire
pub async fn fire_trigger(
    State(state): State<Arc<AppState>>,
    Path(trigger_id): Path<Uuid>,
) -> Reply {
    reply(state.service.fire_trigger(trigger_id).await)
}

/// POST /api/triggers/{trigger_id}/pause
pub async fn pause_trigger(
    State(state): State<Arc<AppState>>,
    Path(trigger_id): Path<Uuid>,
) -> Reply {
    reply(state.service.pause_trigger(trigger_id).await)
}

/// POST /api/triggers/{trigger_id}/resume
pub async fn resume_trigger(
    State(state): State<Arc<AppState>>,
    Path(trigger_id): Path<Uuid>,
) -> Reply {
    reply(state.service.resume_trigger(trigger_id).await)
}

// ---------------------------------------------------------------------------
// GET /api/templates
// ---------------------------------------------------------------------------

pub async fn templates(State(state): State<Arc<AppState>>) -> Reply {
    reply(state.service.list_templates())
}
