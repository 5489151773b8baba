//! `AutomationService`: the long-lived object every entry point talks to.
//!
//! Built once at process start with the driver registry, template catalog,
//! repositories, and optional model; shared by handle afterwards.  Every
//! inbound call returns an [`ApiResponse`]; infrastructure failures during
//! construction are the only `Err`s.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use autoflow_agent::CompletionModel;
use autoflow_drivers::standard_registry;
use autoflow_intent::{
    ErrorPolicy, ExecutionEngine, InMemoryTriggerRepository, InMemoryWorkflowRepository,
    IntentClassifier, PlanGenerator, TemplateCatalog, TemplateMatcher, TriggerRepository,
    TriggerScheduler, TriggerType, WorkflowCompiler, WorkflowRepository,
};
use autoflow_kernel::DriverRegistry;
use autoflow_store::Database;

use crate::config::AppConfig;
use crate::error::{Result, RuntimeError};
use crate::instance::InstanceKey;
use crate::llm::build_model;
use crate::manager::InstanceManager;
use crate::pipeline::MessagePipeline;
use crate::response::{ApiResponse, ResponseStatus};
use crate::sqlite::{
    ConversationLog, NoopConversationLog, SqliteConversationLog, SqliteTriggerRepository,
    SqliteWorkflowRepository,
};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles an [`AutomationService`].  Anything not supplied falls back to
/// the standard drivers, the built-in catalog, in-memory repositories, and
/// no conversation log.
pub struct ServiceBuilder {
    config: AppConfig,
    registry: Option<DriverRegistry>,
    catalog: Option<TemplateCatalog>,
    model: Option<Arc<dyn CompletionModel>>,
    workflows: Option<Arc<dyn WorkflowRepository>>,
    triggers: Option<Arc<dyn TriggerRepository>>,
    conversations: Option<Arc<dyn ConversationLog>>,
}

impl ServiceBuilder {
    pub fn registry(mut self, registry: DriverRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn catalog(mut self, catalog: TemplateCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn model(mut self, model: Arc<dyn CompletionModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn repositories(
        mut self,
        workflows: Arc<dyn WorkflowRepository>,
        triggers: Arc<dyn TriggerRepository>,
    ) -> Self {
        self.workflows = Some(workflows);
        self.triggers = Some(triggers);
        self
    }

    pub fn conversation_log(mut self, log: Arc<dyn ConversationLog>) -> Self {
        self.conversations = Some(log);
        self
    }

    pub fn build(self) -> Result<AutomationService> {
        let config = self.config;
        let registry = match self.registry {
            Some(r) => r,
            None => standard_registry()?,
        };
        let catalog = Arc::new(match self.catalog {
            Some(c) => c,
            None => TemplateCatalog::builtin()?,
        });
        let workflows = self
            .workflows
            .unwrap_or_else(|| Arc::new(InMemoryWorkflowRepository::new()));
        let triggers = self
            .triggers
            .unwrap_or_else(|| Arc::new(InMemoryTriggerRepository::new()));
        let conversations = self
            .conversations
            .unwrap_or_else(|| Arc::new(NoopConversationLog));

        let mut classifier = IntentClassifier::new()?;
        if let Some(model) = &self.model {
            classifier = classifier.with_model(Arc::clone(model));
        }
        let compiler = WorkflowCompiler::new(registry.clone()).with_error_policy(
            ErrorPolicy::from_continue_flag(config.execution.continue_on_failure),
        );
        let engine = ExecutionEngine::new(registry.clone(), config.execution.clone());

        let scheduler = Arc::new(TriggerScheduler::new(
            triggers,
            Arc::clone(&workflows),
            engine.clone(),
            compiler.clone(),
            config.scheduler.clone(),
        ));

        let pipeline = MessagePipeline {
            classifier: Arc::new(classifier),
            matcher: TemplateMatcher::new(Arc::clone(&catalog), config.matching.clone()),
            compiler,
            engine,
            planner: self.model.map(PlanGenerator::new),
            workflows,
            scheduler: Arc::clone(&scheduler),
            context_window: config.instances.context_window,
        };

        info!(
            drivers = registry.count(),
            templates = catalog.len(),
            model = pipeline.planner.is_some(),
            "automation service ready"
        );

        Ok(AutomationService {
            instances: Arc::new(InstanceManager::new(&config.instances)),
            pipeline: Arc::new(pipeline),
            scheduler,
            conversations,
            catalog,
            registry,
            config,
        })
    }
}

// ---------------------------------------------------------------------------
// AutomationService
// ---------------------------------------------------------------------------

/// The automation service.  Cheap to share behind an `Arc`.
pub struct AutomationService {
    config: AppConfig,
    instances: Arc<InstanceManager>,
    pipeline: Arc<MessagePipeline>,
    scheduler: Arc<TriggerScheduler>,
    conversations: Arc<dyn ConversationLog>,
    catalog: Arc<TemplateCatalog>,
    registry: DriverRegistry,
}

impl AutomationService {
    pub fn builder(config: AppConfig) -> ServiceBuilder {
        ServiceBuilder {
            config,
            registry: None,
            catalog: None,
            model: None,
            workflows: None,
            triggers: None,
            conversations: None,
        }
    }

    /// Standard drivers and the built-in catalog over in-memory storage.
    pub fn in_memory(config: AppConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Full production wiring: SQLite storage (or in-memory when ephemeral),
    /// the configured extra catalog, and the configured model.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let db = if config.storage.ephemeral {
            Database::in_memory_migrated().await?
        } else {
            Database::open_and_migrate(config.storage.database_path.clone()).await?
        };

        let catalog = template_catalog(&config)?;
        let model = build_model(&config.llm, |key| std::env::var(key).ok())?;

        let mut builder = Self::builder(config)
            .catalog(catalog)
            .repositories(
                Arc::new(SqliteWorkflowRepository::new(db.clone())),
                Arc::new(SqliteTriggerRepository::new(db.clone())),
            )
            .conversation_log(Arc::new(SqliteConversationLog::new(db)));
        if let Some(model) = model {
            builder = builder.model(model);
        }
        builder.build()
    }

    // -- Instances ----------------------------------------------------------

    /// Create (or reuse) the instance for the key.
    pub fn create_instance(&self, agent_id: &str, session_id: &str, init_data: Value) -> ApiResponse {
        if let Some(bad) = check_key(agent_id, session_id) {
            return bad;
        }
        let instance = self.instances.get_or_create(agent_id, session_id, init_data);
        let status = instance.status(Utc::now());
        ApiResponse::ok(format!("Instance {} ready.", instance.key()))
            .with_data(serde_json::to_value(status).unwrap_or(Value::Null))
    }

    /// Route one message through the instance for the key, creating it on
    /// first use.  A second message for a key that is still processing is
    /// answered with `busy`.
    pub async fn send_message(&self, agent_id: &str, session_id: &str, text: &str) -> ApiResponse {
        if let Some(bad) = check_key(agent_id, session_id) {
            return bad;
        }
        if text.trim().is_empty() {
            return ApiResponse::error("Message is empty.");
        }

        let instance = self.instances.get_or_create(agent_id, session_id, Value::Null);
        let mut state = match instance.try_begin() {
            Ok(state) => state,
            Err(e) => {
                warn!(agent_id, session_id, "instance busy, message rejected");
                return ApiResponse::new(ResponseStatus::Busy, e.to_string());
            }
        };

        let key = InstanceKey::new(agent_id, session_id);
        let response = self.pipeline.handle(&key, &mut state, text).await;
        drop(state);
        instance.touch(Utc::now());

        self.conversations.append(agent_id, session_id, "user", text).await;
        self.conversations
            .append(agent_id, session_id, "assistant", &response.message)
            .await;
        response
    }

    pub fn remove_instance(&self, agent_id: &str, session_id: &str) -> ApiResponse {
        if self.instances.remove(agent_id, session_id) {
            ApiResponse::ok(format!("Instance {agent_id}/{session_id} removed."))
        } else {
            ApiResponse::error(
                RuntimeError::InstanceNotFound {
                    agent_id: agent_id.to_string(),
                    session_id: session_id.to_string(),
                }
                .to_string(),
            )
        }
    }

    pub fn list_instances_status(&self) -> ApiResponse {
        let statuses = self.instances.list_status(Utc::now());
        let message = format!("{} live instance(s).", statuses.len());
        ApiResponse::ok(message).with_data(serde_json::to_value(statuses).unwrap_or(Value::Null))
    }

    // -- Triggers -----------------------------------------------------------

    /// Create a trigger for a stored workflow.  `trigger_type` is one of
    /// `time_based`, `webhook`, `manual`, `db_change`.
    pub async fn create_trigger(
        &self,
        agent_id: &str,
        workflow_id: Uuid,
        trigger_type: &str,
        config: Value,
    ) -> ApiResponse {
        let trigger_type = match TriggerType::from_str(trigger_type) {
            Ok(t) => t,
            Err(e) => return ApiResponse::error(e.to_string()),
        };
        match self
            .scheduler
            .create_trigger(agent_id, workflow_id, trigger_type, config)
            .await
        {
            Ok(trigger) => ApiResponse::ok(format!("Created {trigger_type} trigger."))
                .with_workflow(workflow_id)
                .with_trigger(trigger.trigger_id),
            Err(e) => ApiResponse::error(e.to_string()).with_workflow(workflow_id),
        }
    }

    /// Run a trigger's workflow now and wait for the result.
    pub async fn fire_trigger(&self, trigger_id: Uuid) -> ApiResponse {
        let fired = match self.scheduler.fire(trigger_id, Utc::now()).await {
            Ok(fired) => fired,
            Err(e) => return ApiResponse::error(e.to_string()).with_trigger(trigger_id),
        };
        let workflow_id = fired.workflow_id;
        match fired.handle.await {
            Ok(Ok(result)) => {
                let message = format!("Trigger fired: {}.", result.summary());
                ApiResponse::new(ResponseStatus::Executed, message)
                    .with_result(result)
                    .with_trigger(trigger_id)
            }
            Ok(Err(e)) => ApiResponse::error(e.to_string())
                .with_workflow(workflow_id)
                .with_trigger(trigger_id),
            Err(e) => ApiResponse::error(format!("trigger run aborted: {e}"))
                .with_workflow(workflow_id)
                .with_trigger(trigger_id),
        }
    }

    pub async fn pause_trigger(&self, trigger_id: Uuid) -> ApiResponse {
        match self.scheduler.pause(trigger_id).await {
            Ok(()) => ApiResponse::ok("Trigger paused.").with_trigger(trigger_id),
            Err(e) => ApiResponse::error(e.to_string()).with_trigger(trigger_id),
        }
    }

    pub async fn resume_trigger(&self, trigger_id: Uuid) -> ApiResponse {
        match self.scheduler.resume(trigger_id).await {
            Ok(()) => ApiResponse::ok("Trigger resumed.").with_trigger(trigger_id),
            Err(e) => ApiResponse::error(e.to_string()).with_trigger(trigger_id),
        }
    }

    pub async fn list_triggers(&self, agent_id: &str) -> ApiResponse {
        match self.scheduler.list_triggers(agent_id).await {
            Ok(triggers) => ApiResponse::ok(format!("{} trigger(s).", triggers.len()))
                .with_data(serde_json::to_value(triggers).unwrap_or(Value::Null)),
            Err(e) => ApiResponse::error(e.to_string()),
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Start the background scheduler loop.
    pub async fn start_scheduler(&self) -> Result<()> {
        self.scheduler.start().await?;
        Ok(())
    }

    /// Stop the scheduler and drop every instance.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        let dropped = self.instances.force_cleanup_all();
        info!(dropped, "automation service shut down");
    }

    // -- Accessors ----------------------------------------------------------

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn instances(&self) -> &Arc<InstanceManager> {
        &self.instances
    }

    pub fn scheduler(&self) -> &Arc<TriggerScheduler> {
        &self.scheduler
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Template catalog as a listing payload.
    pub fn list_templates(&self) -> ApiResponse {
        let templates: Vec<Value> = self
            .catalog
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "name": t.name,
                    "category": t.category,
                    "description": t.description,
                    "steps": t.steps.len(),
                })
            })
            .collect();
        ApiResponse::ok(format!("{} template(s).", templates.len())).with_data(Value::Array(templates))
    }
}

impl std::fmt::Debug for AutomationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationService")
            .field("instances", &self.instances.len())
            .field("templates", &self.catalog.len())
            .field("drivers", &self.registry.count())
            .finish_non_exhaustive()
    }
}

fn check_key(agent_id: &str, session_id: &str) -> Option<ApiResponse> {
    (agent_id.trim().is_empty() || session_id.trim().is_empty())
        .then(|| ApiResponse::error("agent_id and session_id are required."))
}

/// The built-in catalog merged with the configured extra catalog, if any.
pub fn template_catalog(config: &AppConfig) -> Result<TemplateCatalog> {
    let catalog = TemplateCatalog::builtin()?;
    let Some(path) = &config.templates.catalog_path else {
        return Ok(catalog);
    };
    let extra = TemplateCatalog::load_file(path)?;
    info!(path = %path.display(), templates = extra.len(), "extra template catalog loaded");
    Ok(catalog.merge(extra))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AutomationService {
        AutomationService::in_memory(AppConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn empty_keys_and_messages_are_rejected() {
        let s = service();
        assert_eq!(s.create_instance("", "s1", Value::Null).status, ResponseStatus::Error);
        assert_eq!(s.send_message("a", " ", "hi").await.status, ResponseStatus::Error);
        assert_eq!(s.send_message("a", "s1", "   ").await.status, ResponseStatus::Error);
        assert!(s.instances().is_empty());
    }

    #[tokio::test]
    async fn small_talk_gets_a_conversation_reply() {
        let s = service();
        let r = s.send_message("agent1", "s1", "hi!").await;
        assert_eq!(r.status, ResponseStatus::Conversation);
        assert!(r.workflow_id.is_none());
        assert_eq!(s.instances().len(), 1);
    }

    #[tokio::test]
    async fn unknown_trigger_type_is_an_error() {
        let s = service();
        let r = s.create_trigger("agent1", Uuid::now_v7(), "sometimes", json!({})).await;
        assert_eq!(r.status, ResponseStatus::Error);
    }

    #[tokio::test]
    async fn trigger_for_missing_workflow_is_an_error() {
        let s = service();
        let r = s.create_trigger("agent1", Uuid::now_v7(), "manual", json!({})).await;
        assert_eq!(r.status, ResponseStatus::Error);
        assert!(r.trigger_id.is_none());
    }

    #[tokio::test]
    async fn remove_unknown_instance_is_an_error() {
        let s = service();
        assert_eq!(s.remove_instance("a", "b").status, ResponseStatus::Error);
        s.create_instance("a", "b", json!({"tier": "free"}));
        assert_eq!(s.remove_instance("a", "b").status, ResponseStatus::Ok);
    }

    #[tokio::test]
    async fn shutdown_clears_instances() {
        let s = service();
        s.create_instance("a", "1", Value::Null);
        s.create_instance("a", "2", Value::Null);
        s.shutdown().await;
        assert!(s.instances().is_empty());
        assert!(!s.scheduler().is_running());
    }
}
