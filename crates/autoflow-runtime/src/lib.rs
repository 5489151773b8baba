//! Agent instance manager and automation service for autoflow.
//!
//! [`AutomationService`] is the inbound surface: it owns the
//! [`InstanceManager`], which keeps one isolated [`AgentInstance`] per
//! `(agent_id, session_id)`, and routes each message through the
//! [`MessagePipeline`] (classify, match, compile, execute).  It also owns
//! the trigger scheduler and, in production, SQLite-backed repositories.

pub mod config;
pub mod error;
pub mod instance;
pub mod llm;
pub mod manager;
pub mod pipeline;
pub mod response;
pub mod service;
pub mod sqlite;

pub use config::{
    AppConfig, DEFAULT_CONFIG_PATH, InstanceConfig, LlmProviderKind, LlmSettings, StorageConfig,
    TemplateConfig, WebConfig,
};
pub use error::{Result, RuntimeError};
pub use instance::{AgentInstance, InstanceKey, InstanceState, InstanceStatus};
pub use llm::build_model;
pub use manager::InstanceManager;
pub use pipeline::MessagePipeline;
pub use response::{ApiResponse, ResponseStatus, TemplateOption};
pub use service::{AutomationService, ServiceBuilder, template_catalog};
pub use sqlite::{
    ConversationLog, NoopConversationLog, SqliteConversationLog, SqliteTriggerRepository,
    SqliteWorkflowRepository,
};
