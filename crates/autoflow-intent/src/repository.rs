//! Persistence boundary.
//!
//! The engine only needs a handful of reads and writes from storage; they
//! are expressed as traits so the scheduler and service can run against
//! SQLite in production and the in-memory versions below in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::{ExecutionResult, ExecutionStatus};
use crate::error::{IntentError, Result};
use crate::trigger::{Trigger, TriggerStatus};
use crate::workflow::Workflow;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Workflow and execution-log storage.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Store (or replace) a compiled workflow owned by `agent_id`.
    async fn save_workflow(&self, agent_id: &str, workflow: &Workflow) -> Result<()>;

    async fn get_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>>;

    /// Record the outcome of one run.
    async fn save_execution_log(
        &self,
        execution_id: Uuid,
        workflow_id: Uuid,
        status: ExecutionStatus,
        result: &ExecutionResult,
    ) -> Result<()>;
}

/// Trigger storage.  Triggers are never deleted through this interface.
#[async_trait]
pub trait TriggerRepository: Send + Sync {
    async fn create_trigger(&self, trigger: &Trigger) -> Result<()>;

    async fn get_trigger(&self, trigger_id: Uuid) -> Result<Option<Trigger>>;

    /// Every trigger whose status is active.
    async fn list_active_triggers(&self) -> Result<Vec<Trigger>>;

    /// Every trigger owned by `agent_id`, oldest first.
    async fn list_triggers(&self, agent_id: &str) -> Result<Vec<Trigger>>;

    async fn update_last_triggered(&self, trigger_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    async fn set_status(&self, trigger_id: Uuid, status: TriggerStatus) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// One stored execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub result: ExecutionResult,
    pub recorded_at: DateTime<Utc>,
}

/// Process-local workflow storage.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: RwLock<HashMap<Uuid, (String, Workflow)>>,
    logs: RwLock<Vec<ExecutionLog>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every execution log recorded so far, oldest first.
    pub async fn execution_logs(&self) -> Vec<ExecutionLog> {
        self.logs.read().await.clone()
    }

    /// Workflow ids owned by `agent_id`.
    pub async fn workflows_for(&self, agent_id: &str) -> Vec<Uuid> {
        self.workflows
            .read()
            .await
            .iter()
            .filter(|(_, (owner, _))| owner == agent_id)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save_workflow(&self, agent_id: &str, workflow: &Workflow) -> Result<()> {
        self.workflows.write().await.insert(
            workflow.workflow_id(),
            (agent_id.to_string(), workflow.clone()),
        );
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>> {
        Ok(self
            .workflows
            .read()
            .await
            .get(&workflow_id)
            .map(|(_, wf)| wf.clone()))
    }

    async fn save_execution_log(
        &self,
        execution_id: Uuid,
        workflow_id: Uuid,
        status: ExecutionStatus,
        result: &ExecutionResult,
    ) -> Result<()> {
        self.logs.write().await.push(ExecutionLog {
            execution_id,
            workflow_id,
            status,
            result: result.clone(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}

/// Process-local trigger storage, kept in creation order.
#[derive(Debug, Default)]
pub struct InMemoryTriggerRepository {
    triggers: RwLock<Vec<Trigger>>,
}

impl InMemoryTriggerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update(&self, trigger_id: Uuid, f: impl FnOnce(&mut Trigger)) -> Result<()> {
        let mut triggers = self.triggers.write().await;
        let trigger = triggers
            .iter_mut()
            .find(|t| t.trigger_id == trigger_id)
            .ok_or(IntentError::TriggerNotFound { trigger_id })?;
        f(trigger);
        Ok(())
    }
}

#[async_trait]
impl TriggerRepository for InMemoryTriggerRepository {
    async fn create_trigger(&self, trigger: &Trigger) -> Result<()> {
        let mut triggers = self.triggers.write().await;
        if triggers.iter().any(|t| t.trigger_id == trigger.trigger_id) {
            return Err(IntentError::Repository {
                reason: format!("trigger {} already exists", trigger.trigger_id),
            });
        }
        triggers.push(trigger.clone());
        Ok(())
    }

    async fn get_trigger(&self, trigger_id: Uuid) -> Result<Option<Trigger>> {
        Ok(self
            .triggers
            .read()
            .await
            .iter()
            .find(|t| t.trigger_id == trigger_id)
            .cloned())
    }

    async fn list_active_triggers(&self) -> Result<Vec<Trigger>> {
        Ok(self
            .triggers
            .read()
            .await
            .iter()
            .filter(|t| t.is_active())
            .cloned()
            .collect())
    }

    async fn list_triggers(&self, agent_id: &str) -> Result<Vec<Trigger>> {
        Ok(self
            .triggers
            .read()
            .await
            .iter()
            .filter(|t| t.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn update_last_triggered(&self, trigger_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.update(trigger_id, |t| t.last_triggered = Some(at)).await
    }

    async fn set_status(&self, trigger_id: Uuid, status: TriggerStatus) -> Result<()> {
        self.update(trigger_id, |t| t.status = status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerType;
    use serde_json::json;

    #[tokio::test]
    async fn trigger_status_filters_active_list() {
        let repo = InMemoryTriggerRepository::new();
        let a = Trigger::new("agent1", Uuid::now_v7(), TriggerType::Manual, json!({})).unwrap();
        let b = Trigger::new("agent2", Uuid::now_v7(), TriggerType::Manual, json!({})).unwrap();
        repo.create_trigger(&a).await.unwrap();
        repo.create_trigger(&b).await.unwrap();
        assert!(repo.create_trigger(&a).await.is_err());

        repo.set_status(a.trigger_id, TriggerStatus::Paused).await.unwrap();
        let active = repo.list_active_triggers().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].trigger_id, b.trigger_id);
        assert_eq!(repo.list_triggers("agent1").await.unwrap().len(), 1);

        let now = Utc::now();
        repo.update_last_triggered(b.trigger_id, now).await.unwrap();
        assert_eq!(
            repo.get_trigger(b.trigger_id).await.unwrap().unwrap().last_triggered,
            Some(now)
        );
        assert!(matches!(
            repo.set_status(Uuid::now_v7(), TriggerStatus::Active).await,
            Err(IntentError::TriggerNotFound { .. })
        ));
    }
}
