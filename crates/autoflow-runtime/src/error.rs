//! Runtime error types.

use std::path::PathBuf;

/// Errors surfaced by the instance manager and the automation service.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    // -- Instance errors -----------------------------------------------------
    /// Another request is already being processed by this instance.
    #[error("instance {agent_id}/{session_id} is busy; retry later")]
    Busy { agent_id: String, session_id: String },

    /// No live instance exists for the key.
    #[error("no instance for {agent_id}/{session_id}")]
    InstanceNotFound { agent_id: String, session_id: String },

    // -- Configuration errors ------------------------------------------------
    /// The config file could not be read.
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`crate::AppConfig`].
    #[error("cannot parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A config value is out of range or inconsistent.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    // -- Wrapped errors ------------------------------------------------------
    #[error(transparent)]
    Intent(#[from] autoflow_intent::IntentError),

    #[error(transparent)]
    Store(#[from] autoflow_store::StoreError),

    #[error(transparent)]
    Agent(#[from] autoflow_agent::AgentError),

    #[error(transparent)]
    Kernel(#[from] autoflow_kernel::KernelError),
}

/// Convenience alias used throughout the runtime crate.
pub type Result<T> = std::result::Result<T, RuntimeError>;
