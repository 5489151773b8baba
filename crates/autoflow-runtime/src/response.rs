//! Structured responses returned by every service entry point.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use autoflow_intent::ExecutionResult;

/// What kind of answer a response is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// A management call succeeded.
    Ok,
    /// A workflow ran; see `execution_result`.
    Executed,
    /// A workflow was stored with a time-based trigger and will run on the
    /// next scheduler pass.
    Scheduled,
    /// The workflow needs more parameters; see `missing_params`.
    NeedsInput,
    /// Several templates fit; see `options`.
    AwaitingSelection,
    /// The message was not an automation request.
    Conversation,
    /// Nothing in the catalog (or the planner) could handle the request.
    NoMatch,
    /// A pending workflow or selection was dropped on request.
    Cancelled,
    /// The instance is still handling an earlier message.
    Busy,
    Error,
}

impl ResponseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Executed => "executed",
            Self::Scheduled => "scheduled",
            Self::NeedsInput => "needs_input",
            Self::AwaitingSelection => "awaiting_selection",
            Self::Conversation => "conversation",
            Self::NoMatch => "no_match",
            Self::Cancelled => "cancelled",
            Self::Busy => "busy",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One template offered for selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateOption {
    /// 1-based position the user can reply with.
    pub index: usize,
    pub template_id: String,
    pub name: String,
    pub description: String,
    pub score: f64,
}

/// Response record for every inbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: ResponseStatus,
    /// Human-readable text, always present.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_params: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<TemplateOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<Uuid>,
    /// Extra payload for listing calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn new(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            workflow_id: None,
            execution_result: None,
            missing_params: Vec::new(),
            options: Vec::new(),
            trigger_id: None,
            data: None,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(ResponseStatus::Ok, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResponseStatus::Error, message)
    }

    pub fn with_workflow(mut self, workflow_id: Uuid) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    pub fn with_result(mut self, result: ExecutionResult) -> Self {
        self.workflow_id = Some(result.workflow_id);
        self.execution_result = Some(result);
        self
    }

    pub fn with_missing(mut self, missing: Vec<String>) -> Self {
        self.missing_params = missing;
        self
    }

    pub fn with_options(mut self, options: Vec<TemplateOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_trigger(mut self, trigger_id: Uuid) -> Self {
        self.trigger_id = Some(trigger_id);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether the call did what was asked.
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            ResponseStatus::Ok
                | ResponseStatus::Executed
                | ResponseStatus::Scheduled
                | ResponseStatus::Conversation
                | ResponseStatus::Cancelled
        )
    }
}
