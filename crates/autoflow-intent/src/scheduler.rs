//! Background trigger scheduler.
//!
//! [`TriggerScheduler`] polls the trigger repository, decides which active
//! triggers are due, and hands their stored workflows to the execution
//! engine.  Each firing runs on its own tokio task with a fresh execution
//! context, so a slow workflow never delays the polling loop.
//!
//! Failures are isolated per trigger: a broken config, a missing workflow,
//! or a validation error is logged and the remaining triggers still fire.
//! `last_triggered` is written only after the execution task has been
//! spawned, so a firing that never started is retried on the next tick.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::compiler::WorkflowCompiler;
use crate::config::SchedulerConfig;
use crate::engine::{ExecutionEngine, ExecutionResult};
use crate::error::{IntentError, Result};
use crate::repository::{TriggerRepository, WorkflowRepository};
use crate::trigger::{Trigger, TriggerStatus, TriggerType};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A trigger found due by [`TriggerScheduler::tick`].
#[derive(Debug, Clone, PartialEq)]
pub struct DueTrigger {
    pub trigger_id: Uuid,
    pub workflow_id: Uuid,
    pub agent_id: String,
    pub last_triggered: Option<DateTime<Utc>>,
}

/// A firing that has been handed to the engine.
#[derive(Debug)]
pub struct FiredTrigger {
    pub trigger_id: Uuid,
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub fired_at: DateTime<Utc>,
    /// Resolves when the run finishes; dropping it detaches the run.
    pub handle: JoinHandle<Result<ExecutionResult>>,
}

/// Outcome of one polling pass.
#[derive(Debug, Default)]
pub struct TickReport {
    pub fired: Vec<FiredTrigger>,
    /// `(trigger_id, reason)` for every trigger that could not be fired.
    pub failures: Vec<(Uuid, String)>,
}

// ---------------------------------------------------------------------------
// TriggerScheduler
// ---------------------------------------------------------------------------

/// Polls triggers and fires due workflows.
pub struct TriggerScheduler {
    triggers: Arc<dyn TriggerRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    engine: ExecutionEngine,
    compiler: WorkflowCompiler,
    config: SchedulerConfig,
    /// Triggers whose previous run has not finished yet.
    in_flight: Arc<std::sync::Mutex<HashSet<Uuid>>>,
    running: AtomicBool,
    shutdown: Notify,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TriggerScheduler {
    pub fn new(
        triggers: Arc<dyn TriggerRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        engine: ExecutionEngine,
        compiler: WorkflowCompiler,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            triggers,
            workflows,
            engine,
            compiler,
            config,
            in_flight: Arc::new(std::sync::Mutex::new(HashSet::new())),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            handle: Mutex::new(None),
        }
    }

    // -- Trigger management -------------------------------------------------

    /// Create and persist a trigger for an existing workflow.
    pub async fn create_trigger(
        &self,
        agent_id: &str,
        workflow_id: Uuid,
        trigger_type: TriggerType,
        config: Value,
    ) -> Result<Trigger> {
        if self.workflows.get_workflow(workflow_id).await?.is_none() {
            return Err(IntentError::WorkflowNotFound { workflow_id });
        }
        let trigger = Trigger::new(agent_id, workflow_id, trigger_type, config)?;
        self.triggers.create_trigger(&trigger).await?;
        info!(
            trigger_id = %trigger.trigger_id,
            %workflow_id,
            agent_id,
            trigger_type = %trigger_type,
            "trigger created"
        );
        Ok(trigger)
    }

    pub async fn pause(&self, trigger_id: Uuid) -> Result<()> {
        self.set_status(trigger_id, TriggerStatus::Paused).await
    }

    pub async fn resume(&self, trigger_id: Uuid) -> Result<()> {
        self.set_status(trigger_id, TriggerStatus::Active).await
    }

    pub async fn list_triggers(&self, agent_id: &str) -> Result<Vec<Trigger>> {
        self.triggers.list_triggers(agent_id).await
    }

    async fn set_status(&self, trigger_id: Uuid, status: TriggerStatus) -> Result<()> {
        self.triggers.set_status(trigger_id, status).await?;
        info!(%trigger_id, %status, "trigger status changed");
        Ok(())
    }

    // -- Polling ------------------------------------------------------------

    /// Active triggers due at `now`, excluding ones still running.
    ///
    /// Only a failure to list triggers is an error; a trigger whose config
    /// cannot be evaluated is logged and skipped.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<DueTrigger>> {
        let active = self.triggers.list_active_triggers().await?;
        let mut due = Vec::new();

        for trigger in active {
            match trigger.check_due(now) {
                Ok(true) if self.is_in_flight(trigger.trigger_id) => {
                    debug!(trigger_id = %trigger.trigger_id, "trigger still running, not due");
                }
                Ok(true) => due.push(DueTrigger {
                    trigger_id: trigger.trigger_id,
                    workflow_id: trigger.workflow_id,
                    agent_id: trigger.agent_id,
                    last_triggered: trigger.last_triggered,
                }),
                Ok(false) => {}
                Err(e) => {
                    warn!(trigger_id = %trigger.trigger_id, error = %e, "trigger evaluation failed");
                }
            }
        }

        debug!(due = due.len(), "scheduler tick");
        Ok(due)
    }

    /// Fire one trigger now, whatever its type or status.
    ///
    /// Returns once the run has been spawned; await
    /// [`FiredTrigger::handle`] for its result.
    pub async fn fire(&self, trigger_id: Uuid, now: DateTime<Utc>) -> Result<FiredTrigger> {
        if !self.claim(trigger_id) {
            return Err(IntentError::Scheduler {
                trigger_id,
                reason: "previous run has not finished".to_string(),
            });
        }

        let prepared = self.prepare(trigger_id).await;
        let (trigger, workflow) = match prepared {
            Ok(found) => found,
            Err(e) => {
                self.release(trigger_id);
                return Err(e);
            }
        };

        let execution_id = Uuid::now_v7();
        let workflow_id = workflow.workflow_id();
        let engine = self.engine.clone();
        let workflows = Arc::clone(&self.workflows);
        let in_flight = Arc::clone(&self.in_flight);

        let handle = tokio::spawn(async move {
            let outcome = engine.execute_with_id(&workflow, execution_id).await;
            match &outcome {
                Ok(result) => {
                    if let Err(e) = workflows
                        .save_execution_log(execution_id, workflow_id, result.status, result)
                        .await
                    {
                        warn!(%execution_id, error = %e, "failed to save execution log");
                    }
                    info!(
                        %trigger_id,
                        %execution_id,
                        status = %result.status,
                        summary = %result.summary(),
                        "triggered run finished"
                    );
                }
                Err(e) => {
                    error!(%trigger_id, %execution_id, error = %e, "triggered run refused");
                }
            }
            if let Ok(mut set) = in_flight.lock() {
                set.remove(&trigger_id);
            }
            outcome
        });

        // The run is handed off; only now does the firing count.
        if let Err(e) = self.triggers.update_last_triggered(trigger_id, now).await {
            error!(%trigger_id, error = %e, "failed to record last_triggered");
            return Err(IntentError::Scheduler {
                trigger_id,
                reason: format!("run {execution_id} started but last_triggered not saved: {e}"),
            });
        }

        info!(
            %trigger_id,
            %workflow_id,
            %execution_id,
            trigger_type = %trigger.trigger_type,
            "trigger fired"
        );

        Ok(FiredTrigger {
            trigger_id,
            workflow_id,
            execution_id,
            fired_at: now,
            handle,
        })
    }

    /// One full pass: find due triggers and fire each of them.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut report = TickReport::default();
        for due in self.tick(now).await? {
            match self.fire(due.trigger_id, now).await {
                Ok(fired) => report.fired.push(fired),
                Err(e) => {
                    warn!(trigger_id = %due.trigger_id, error = %e, "trigger firing failed");
                    report.failures.push((due.trigger_id, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    // -- Background loop ----------------------------------------------------

    /// Spawn the polling loop on the current runtime.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(IntentError::AlreadyRunning);
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!(
                poll_interval_secs = this.config.poll_interval_secs,
                "trigger scheduler started"
            );

            while this.running.load(Ordering::SeqCst) {
                let wait = match this.run_once(Utc::now()).await {
                    Ok(report) => {
                        if !report.fired.is_empty() || !report.failures.is_empty() {
                            info!(
                                fired = report.fired.len(),
                                failed = report.failures.len(),
                                "scheduler pass complete"
                            );
                        }
                        this.config.poll_interval()
                    }
                    Err(e) => {
                        error!(error = %e, "scheduler pass failed, backing off");
                        this.config.poll_interval() + this.config.error_backoff()
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(wait.max(Duration::from_millis(10))) => {}
                    _ = this.shutdown.notified() => break,
                }
            }

            info!("trigger scheduler stopped");
        });

        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the polling loop and wait for it to exit.  Runs already spawned
    /// keep going.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("stop called but scheduler is not running");
            return;
        }
        self.shutdown.notify_one();

        if let Some(handle) = self.handle.lock().await.take()
            && let Err(e) = handle.await
        {
            error!(error = %e, "scheduler task panicked during shutdown");
        }
        info!("trigger scheduler shutdown complete");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // -- Private helpers ----------------------------------------------------

    async fn prepare(&self, trigger_id: Uuid) -> Result<(Trigger, crate::workflow::Workflow)> {
        let trigger = self
            .triggers
            .get_trigger(trigger_id)
            .await?
            .ok_or(IntentError::TriggerNotFound { trigger_id })?;
        let workflow = self
            .workflows
            .get_workflow(trigger.workflow_id)
            .await?
            .ok_or(IntentError::WorkflowNotFound {
                workflow_id: trigger.workflow_id,
            })?;
        self.compiler.revalidate(&workflow)?;
        Ok((trigger, workflow))
    }

    fn claim(&self, trigger_id: Uuid) -> bool {
        self.in_flight
            .lock()
            .map(|mut set| set.insert(trigger_id))
            .unwrap_or(false)
    }

    fn release(&self, trigger_id: Uuid) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&trigger_id);
        }
    }

    fn is_in_flight(&self, trigger_id: Uuid) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(&trigger_id))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for TriggerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerScheduler")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use autoflow_drivers::DryRunDriver;
    use autoflow_kernel::{DriverRegistry, OperationSpec};
    use chrono::TimeDelta;
    use serde_json::json;

    use crate::compiler::{CompileSource, FreeformPlan};
    use crate::config::ExecutionConfig;
    use crate::engine::ExecutionStatus;
    use crate::repository::{InMemoryTriggerRepository, InMemoryWorkflowRepository};
    use crate::workflow::Workflow;

    struct Fixture {
        scheduler: Arc<TriggerScheduler>,
        triggers: Arc<InMemoryTriggerRepository>,
        workflows: Arc<InMemoryWorkflowRepository>,
        driver: Arc<DryRunDriver>,
        workflow: Workflow,
    }

    async fn fixture(driver: DryRunDriver) -> Fixture {
        let driver = Arc::new(driver);
        let registry = DriverRegistry::builder()
            .register(driver.clone())
            .unwrap()
            .build();
        let compiler = WorkflowCompiler::new(registry.clone());
        let plan: FreeformPlan = serde_json::from_value(json!({
            "name": "ping",
            "steps": [{"step_id": "p", "driver": "notify", "operation": "send",
                       "parameters": {"message": "ping"}}]
        }))
        .unwrap();
        let workflow = compiler.compile(CompileSource::Plan(&plan), &BTreeMap::new());

        let triggers = Arc::new(InMemoryTriggerRepository::new());
        let workflows = Arc::new(InMemoryWorkflowRepository::new());
        workflows.save_workflow("agent", &workflow).await.unwrap();

        let scheduler = Arc::new(TriggerScheduler::new(
            triggers.clone(),
            workflows.clone(),
            ExecutionEngine::new(registry, ExecutionConfig::default()),
            compiler,
            SchedulerConfig::default(),
        ));
        Fixture {
            scheduler,
            triggers,
            workflows,
            driver,
            workflow,
        }
    }

    fn notify() -> DryRunDriver {
        DryRunDriver::new(
            "notify",
            "",
            vec![OperationSpec::new("send", "").require(["message"])],
        )
    }

    #[tokio::test]
    async fn due_trigger_fires_and_records() {
        let f = fixture(notify()).await;
        let trigger = f
            .scheduler
            .create_trigger(
                "agent",
                f.workflow.workflow_id(),
                TriggerType::TimeBased,
                json!({"interval": 60}),
            )
            .await
            .unwrap();

        let now = Utc::now();
        let report = f.scheduler.run_once(now).await.unwrap();
        assert_eq!(report.fired.len(), 1);
        let fired = report.fired.into_iter().next().unwrap();
        let result = fired.handle.await.unwrap().unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(f.driver.call_count("send"), 1);

        let stored = f.triggers.get_trigger(trigger.trigger_id).await.unwrap().unwrap();
        assert_eq!(stored.last_triggered, Some(now));
        assert_eq!(f.workflows.execution_logs().await.len(), 1);

        // Not due again until the interval elapses.
        assert!(f.scheduler.tick(now + TimeDelta::minutes(30)).await.unwrap().is_empty());
        assert_eq!(
            f.scheduler.tick(now + TimeDelta::minutes(61)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn broken_triggers_do_not_block_others() {
        let f = fixture(notify()).await;
        let good = f
            .scheduler
            .create_trigger("agent", f.workflow.workflow_id(), TriggerType::TimeBased, json!({"interval": 5}))
            .await
            .unwrap();

        // A trigger whose workflow vanished from storage.
        let orphan = Trigger::new("agent", Uuid::now_v7(), TriggerType::TimeBased, json!({"interval": 5}))
            .unwrap();
        f.triggers.create_trigger(&orphan).await.unwrap();

        let report = f.scheduler.run_once(Utc::now()).await.unwrap();
        assert_eq!(report.fired.len(), 1);
        assert_eq!(report.fired[0].trigger_id, good.trigger_id);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, orphan.trigger_id);

        // The orphan was never handed off, so it stays never-fired.
        let stored = f.triggers.get_trigger(orphan.trigger_id).await.unwrap().unwrap();
        assert!(stored.last_triggered.is_none());
    }

    #[tokio::test]
    async fn manual_triggers_only_fire_explicitly() {
        let f = fixture(notify()).await;
        let manual = f
            .scheduler
            .create_trigger("agent", f.workflow.workflow_id(), TriggerType::Manual, json!({}))
            .await
            .unwrap();
        assert!(f.scheduler.tick(Utc::now()).await.unwrap().is_empty());

        f.scheduler.pause(manual.trigger_id).await.unwrap();
        let fired = f.scheduler.fire(manual.trigger_id, Utc::now()).await.unwrap();
        fired.handle.await.unwrap().unwrap();
        assert_eq!(f.driver.call_count("send"), 1);
    }

    #[tokio::test]
    async fn running_trigger_is_not_fired_twice() {
        let f = fixture(notify().with_delay("send", Duration::from_millis(200))).await;
        let t = f
            .scheduler
            .create_trigger("agent", f.workflow.workflow_id(), TriggerType::Manual, json!({}))
            .await
            .unwrap();

        let first = f.scheduler.fire(t.trigger_id, Utc::now()).await.unwrap();
        let second = f.scheduler.fire(t.trigger_id, Utc::now()).await;
        assert!(matches!(second, Err(IntentError::Scheduler { .. })));

        first.handle.await.unwrap().unwrap();
        let again = f.scheduler.fire(t.trigger_id, Utc::now()).await.unwrap();
        again.handle.await.unwrap().unwrap();
        assert_eq!(f.driver.call_count("send"), 2);
    }

    #[tokio::test]
    async fn create_trigger_checks_workflow_and_config() {
        let f = fixture(notify()).await;
        let missing = f
            .scheduler
            .create_trigger("agent", Uuid::now_v7(), TriggerType::Manual, json!({}))
            .await;
        assert!(matches!(missing, Err(IntentError::WorkflowNotFound { .. })));

        let bad = f
            .scheduler
            .create_trigger("agent", f.workflow.workflow_id(), TriggerType::TimeBased, json!({}))
            .await;
        assert!(matches!(bad, Err(IntentError::InvalidTriggerConfig { .. })));
    }

    #[tokio::test]
    async fn loop_starts_once_and_stops() {
        let f = fixture(notify()).await;
        f.scheduler.start().await.unwrap();
        assert!(f.scheduler.is_running());
        assert!(matches!(
            f.scheduler.start().await,
            Err(IntentError::AlreadyRunning)
        ));
        f.scheduler.stop().await;
        assert!(!f.scheduler.is_running());
    }
}
