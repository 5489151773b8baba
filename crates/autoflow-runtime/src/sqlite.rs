//! SQLite-backed implementations of the engine's persistence boundary.
//!
//! The store crate speaks in rows and JSON; these adapters convert to and
//! from the typed workflow and trigger records.  A workflow document is
//! decoded with its schema-version check, so a row written by an
//! incompatible build is reported rather than half-read.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tracing::warn;
use uuid::Uuid;

use autoflow_intent::{
    ExecutionResult, ExecutionStatus, IntentError, Trigger, TriggerRepository, TriggerStatus,
    TriggerType, Workflow, WorkflowRepository,
};
use autoflow_store::{
    ConversationStore, Database, ExecutionLogStore, StoreError, StoredTrigger, StoredWorkflow,
    TriggerStore, WorkflowStore,
};

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

/// Workflow and execution-log repository over SQLite.
#[derive(Debug, Clone)]
pub struct SqliteWorkflowRepository {
    workflows: WorkflowStore,
    logs: ExecutionLogStore,
}

impl SqliteWorkflowRepository {
    pub fn new(db: Database) -> Self {
        Self {
            workflows: WorkflowStore::new(db.clone()),
            logs: ExecutionLogStore::new(db),
        }
    }
}

#[async_trait]
impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_workflow(&self, agent_id: &str, workflow: &Workflow) -> autoflow_intent::Result<()> {
        let record = StoredWorkflow::new(
            workflow.workflow_id().to_string(),
            agent_id,
            workflow.name(),
            workflow.template_id().map(str::to_string),
            workflow.schema_version(),
            workflow.to_json()?,
            workflow.is_valid(),
        );
        self.workflows.save(&record).await.map_err(repo_err)
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> autoflow_intent::Result<Option<Workflow>> {
        let Some(row) = self
            .workflows
            .get(&workflow_id.to_string())
            .await
            .map_err(repo_err)?
        else {
            return Ok(None);
        };
        Workflow::from_json(&row.document).map(Some)
    }

    async fn save_execution_log(
        &self,
        execution_id: Uuid,
        workflow_id: Uuid,
        status: ExecutionStatus,
        result: &ExecutionResult,
    ) -> autoflow_intent::Result<()> {
        let value = serde_json::to_value(result)?;
        self.logs
            .record(
                &execution_id.to_string(),
                &workflow_id.to_string(),
                status.as_str(),
                &value,
            )
            .await
            .map_err(repo_err)
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// Trigger repository over SQLite.
#[derive(Debug, Clone)]
pub struct SqliteTriggerRepository {
    triggers: TriggerStore,
}

impl SqliteTriggerRepository {
    pub fn new(db: Database) -> Self {
        Self {
            triggers: TriggerStore::new(db),
        }
    }
}

#[async_trait]
impl TriggerRepository for SqliteTriggerRepository {
    async fn create_trigger(&self, trigger: &Trigger) -> autoflow_intent::Result<()> {
        let row = StoredTrigger {
            id: trigger.trigger_id.to_string(),
            agent_id: trigger.agent_id.clone(),
            workflow_id: trigger.workflow_id.to_string(),
            trigger_type: trigger.trigger_type.as_str().to_string(),
            config: trigger.config.clone(),
            status: trigger.status.as_str().to_string(),
            last_triggered: trigger.last_triggered.map(|t| t.timestamp_millis()),
            created_at: trigger.created_at.timestamp_millis(),
        };
        self.triggers.create(&row).await.map_err(repo_err)
    }

    async fn get_trigger(&self, trigger_id: Uuid) -> autoflow_intent::Result<Option<Trigger>> {
        self.triggers
            .get(&trigger_id.to_string())
            .await
            .map_err(repo_err)?
            .map(decode_trigger)
            .transpose()
    }

    async fn list_active_triggers(&self) -> autoflow_intent::Result<Vec<Trigger>> {
        decode_all(self.triggers.list_active().await.map_err(repo_err)?)
    }

    async fn list_triggers(&self, agent_id: &str) -> autoflow_intent::Result<Vec<Trigger>> {
        decode_all(self.triggers.list_for_agent(agent_id).await.map_err(repo_err)?)
    }

    async fn update_last_triggered(
        &self,
        trigger_id: Uuid,
        at: DateTime<Utc>,
    ) -> autoflow_intent::Result<()> {
        self.triggers
            .update_last_triggered(&trigger_id.to_string(), at.timestamp_millis())
            .await
            .map_err(|e| not_found_or(e, trigger_id))
    }

    async fn set_status(&self, trigger_id: Uuid, status: TriggerStatus) -> autoflow_intent::Result<()> {
        self.triggers
            .set_status(&trigger_id.to_string(), status.as_str())
            .await
            .map_err(|e| not_found_or(e, trigger_id))
    }
}

/// Decode every row, skipping (and logging) rows that no longer parse so
/// one bad trigger cannot stall the scheduler.
fn decode_all(rows: Vec<StoredTrigger>) -> autoflow_intent::Result<Vec<Trigger>> {
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            match decode_trigger(row) {
                Ok(trigger) => Some(trigger),
                Err(e) => {
                    warn!(trigger_id = %id, error = %e, "skipping unreadable trigger");
                    None
                }
            }
        })
        .collect())
}

fn decode_trigger(row: StoredTrigger) -> autoflow_intent::Result<Trigger> {
    let corrupt = |what: &str| IntentError::Repository {
        reason: format!("trigger {}: bad {what}", row.id),
    };
    Ok(Trigger {
        trigger_id: Uuid::parse_str(&row.id).map_err(|_| corrupt("id"))?,
        agent_id: row.agent_id.clone(),
        workflow_id: Uuid::parse_str(&row.workflow_id).map_err(|_| corrupt("workflow id"))?,
        trigger_type: TriggerType::from_str(&row.trigger_type)?,
        config: row.config.clone(),
        status: TriggerStatus::from_str(&row.status)?,
        last_triggered: row
            .last_triggered
            .map(|ms| millis_to_utc(ms).ok_or_else(|| corrupt("last_triggered")))
            .transpose()?,
        created_at: millis_to_utc(row.created_at).ok_or_else(|| corrupt("created_at"))?,
    })
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn repo_err(e: StoreError) -> IntentError {
    IntentError::Repository {
        reason: e.to_string(),
    }
}

fn not_found_or(e: StoreError, trigger_id: Uuid) -> IntentError {
    match e {
        StoreError::NotFound { .. } => IntentError::TriggerNotFound { trigger_id },
        other => repo_err(other),
    }
}

// ---------------------------------------------------------------------------
// Conversation log
// ---------------------------------------------------------------------------

/// Durable sink for conversation turns.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn append(&self, agent_id: &str, session_id: &str, role: &str, content: &str);
}

/// Discards every turn.
#[derive(Debug, Default)]
pub struct NoopConversationLog;

#[async_trait]
impl ConversationLog for NoopConversationLog {
    async fn append(&self, _agent_id: &str, _session_id: &str, _role: &str, _content: &str) {}
}

/// Appends turns to the `conversation_messages` table.  Write failures are
/// logged and swallowed; the live conversation does not depend on them.
#[derive(Debug, Clone)]
pub struct SqliteConversationLog {
    store: ConversationStore,
}

impl SqliteConversationLog {
    pub fn new(db: Database) -> Self {
        Self {
            store: ConversationStore::new(db),
        }
    }
}

#[async_trait]
impl ConversationLog for SqliteConversationLog {
    async fn append(&self, agent_id: &str, session_id: &str, role: &str, content: &str) {
        if let Err(e) = self.store.append(agent_id, session_id, role, content).await {
            warn!(agent_id, session_id, error = %e, "failed to log conversation turn");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
