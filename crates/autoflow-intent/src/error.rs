//! Intent engine error types.
//!
//! All intent subsystems surface errors through [`IntentError`].  Each variant
//! carries enough context for callers to decide how to handle the failure.
//!
//! Classifier degradation is deliberately absent: a failed or malformed model
//! call is recorded on the returned [`Intent`](crate::classifier::Intent)
//! instead of being raised.  Likewise a failing driver call is a per-step
//! record inside an [`ExecutionResult`](crate::engine::ExecutionResult).

use uuid::Uuid;

use crate::workflow::ValidationReport;

/// Unified error type for the intent engine.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    // -- Compiler errors -----------------------------------------------------
    /// The workflow failed structural validation and must not run.
    #[error("workflow {workflow_id} is invalid: {}", .report.summary())]
    Validation {
        workflow_id: Uuid,
        report: ValidationReport,
    },

    /// A template id was not found in the catalog.
    #[error("template not found: {template_id}")]
    TemplateNotFound { template_id: String },

    /// A template catalog could not be loaded.
    #[error("failed to load template catalog: {reason}")]
    CatalogLoad { reason: String },

    /// A freeform plan could not be parsed.
    #[error("invalid plan: {reason}")]
    InvalidPlan { reason: String },

    /// A serialized workflow carries an unknown schema version.
    #[error("unsupported workflow schema version {found} (expected {expected})")]
    UnsupportedSchemaVersion { found: u32, expected: u32 },

    // -- Workflow storage errors ---------------------------------------------
    /// The referenced workflow does not exist.
    #[error("workflow not found: {workflow_id}")]
    WorkflowNotFound { workflow_id: Uuid },

    /// A repository read or write failed.
    #[error("repository error: {reason}")]
    Repository { reason: String },

    // -- Trigger errors ------------------------------------------------------
    /// The referenced trigger does not exist.
    #[error("trigger not found: {trigger_id}")]
    TriggerNotFound { trigger_id: Uuid },

    /// A trigger's config does not describe a usable schedule.
    #[error("invalid trigger config: {reason}")]
    InvalidTriggerConfig { reason: String },

    /// A cron expression is invalid.
    #[error("invalid cron expression `{expression}`: {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    /// Evaluating or firing one trigger failed.
    #[error("scheduler error for trigger {trigger_id}: {reason}")]
    Scheduler { trigger_id: Uuid, reason: String },

    /// The scheduler loop was started twice.
    #[error("scheduler is already running")]
    AlreadyRunning,

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the kernel crate.
    #[error("kernel error: {0}")]
    Kernel(#[from] autoflow_kernel::KernelError),

    /// An error propagated from the agent crate.
    #[error("agent error: {0}")]
    Agent(#[from] autoflow_agent::AgentError),

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal intent error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the intent crate.
pub type Result<T> = std::result::Result<T, IntentError>;
