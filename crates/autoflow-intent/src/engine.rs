//! Execution engine -- runs a compiled [`Workflow`] against the driver registry.
//!
//! Steps run in dependency order; among ready steps the one declared first
//! goes first, so a sequential run of an edge-free workflow follows
//! declaration order exactly.  With `concurrent` enabled, every ready step of
//! a wave is dispatched together.
//!
//! Each run owns a fresh [`ExecutionContext`].  Before dispatch a step's
//! `step:<id>.output` references are resolved from it; a step whose
//! dependency failed or was skipped, or whose reference cannot be resolved,
//! is skipped.  A driver failure (including a timeout) fails only that step
//! unless the workflow is fail-fast.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use autoflow_kernel::{DriverRegistry, ParamMap};

use crate::compiler::ensure_valid;
use crate::config::ExecutionConfig;
use crate::error::Result;
use crate::workflow::{ErrorPolicy, Step, StepRef, Workflow};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    PartiallyFailed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyFailed | Self::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final state of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    pub driver: String,
    pub operation: String,
    pub status: StepStatus,
    /// Driver calls made; zero for skipped steps.
    pub attempts: u32,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Per-step records in execution order.
    pub steps: Vec<StepRecord>,
    /// Outputs of every completed step, keyed by step id.
    pub context: ParamMap,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn step(&self, step_id: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Short human summary, e.g. `2/3 steps succeeded (1 failed)`.
    pub fn summary(&self) -> String {
        let mut text = format!("{}/{} steps succeeded", self.succeeded, self.total);
        let mut extra = Vec::new();
        if self.failed > 0 {
            extra.push(format!("{} failed", self.failed));
        }
        if self.skipped > 0 {
            extra.push(format!("{} skipped", self.skipped));
        }
        if !extra.is_empty() {
            text.push_str(&format!(" ({})", extra.join(", ")));
        }
        text
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Per-run map of completed step outputs.  Each key is written at most once.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    outputs: ParamMap,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step's output.  Returns `false` (and keeps the first value)
    /// if the step already has one.
    pub fn insert(&mut self, step_id: &str, output: Value) -> bool {
        if self.outputs.contains_key(step_id) {
            return false;
        }
        self.outputs.insert(step_id.to_string(), output);
        true
    }

    pub fn get(&self, step_id: &str) -> Option<&Value> {
        self.outputs.get(step_id)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn as_map(&self) -> &ParamMap {
        &self.outputs
    }

    pub fn into_map(self) -> ParamMap {
        self.outputs
    }

    /// Resolve every runtime reference inside `value`.
    pub fn resolve(&self, value: &Value) -> std::result::Result<Value, String> {
        match value {
            Value::String(s) => self.resolve_str(s),
            Value::Array(items) => items
                .iter()
                .map(|v| self.resolve(v))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| self.resolve(v).map(|v| (k.clone(), v)))
                .collect::<std::result::Result<ParamMap, _>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    fn resolve_str(&self, text: &str) -> std::result::Result<Value, String> {
        if let Some(r) = StepRef::parse(text) {
            return self.lookup(&r);
        }

        let embedded = StepRef::embedded(text);
        if embedded.is_empty() {
            return Ok(Value::String(text.to_string()));
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for (range, r) in embedded {
            out.push_str(&text[last..range.start]);
            match self.lookup(&r)? {
                Value::String(s) => out.push_str(&s),
                other => out.push_str(&other.to_string()),
            }
            last = range.end;
        }
        out.push_str(&text[last..]);
        Ok(Value::String(out))
    }

    fn lookup(&self, r: &StepRef) -> std::result::Result<Value, String> {
        let output = self
            .outputs
            .get(&r.step_id)
            .ok_or_else(|| format!("`{r}` is not available: step `{}` has no output", r.step_id))?;
        match &r.field {
            None => Ok(output.clone()),
            Some(field) => output
                .get(field)
                .cloned()
                .ok_or_else(|| format!("`{r}` is not available: output has no field `{field}`")),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionEngine
// ---------------------------------------------------------------------------

/// Runs validated workflows.  Cheap to clone; holds no per-run state.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    registry: DriverRegistry,
    config: ExecutionConfig,
}

/// A step ready for dispatch with its parameters resolved.
struct Dispatch<'a> {
    index: usize,
    step: &'a Step,
    parameters: ParamMap,
}

impl ExecutionEngine {
    pub fn new(registry: DriverRegistry, config: ExecutionConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Run `workflow` under a new execution id.
    pub async fn execute(&self, workflow: &Workflow) -> Result<ExecutionResult> {
        self.execute_with_id(workflow, Uuid::now_v7()).await
    }

    /// Run `workflow` under a caller-chosen execution id.
    ///
    /// Fails only if the workflow is invalid; driver failures are recorded in
    /// the result.
    pub async fn execute_with_id(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
    ) -> Result<ExecutionResult> {
        ensure_valid(workflow)?;

        let started_at = Utc::now();
        let steps = workflow.steps();
        let index_of: HashMap<&str, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.step_id.as_str(), i))
            .collect();

        info!(
            %execution_id,
            workflow_id = %workflow.workflow_id(),
            steps = steps.len(),
            status = %ExecutionStatus::Running,
            "execution started"
        );

        let mut context = ExecutionContext::new();
        let mut records: Vec<Option<StepRecord>> = vec![None; steps.len()];
        let mut order: Vec<usize> = Vec::with_capacity(steps.len());
        let mut remaining: BTreeSet<usize> = (0..steps.len()).collect();
        let mut halted = false;

        while !remaining.is_empty() {
            let ready: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&i| {
                    workflow
                        .dependencies_of(&steps[i].step_id)
                        .iter()
                        .all(|d| index_of.get(d.as_str()).is_some_and(|&j| records[j].is_some()))
                })
                .collect();

            if ready.is_empty() {
                // Validation rules this out; skip rather than spin.
                for i in std::mem::take(&mut remaining) {
                    records[i] = Some(skipped(&steps[i], "dependencies can never complete"));
                    order.push(i);
                }
                break;
            }

            let batch: Vec<usize> = if self.config.concurrent {
                ready
            } else {
                vec![ready[0]]
            };

            let mut dispatch: Vec<Dispatch<'_>> = Vec::new();
            for &i in &batch {
                remaining.remove(&i);
                let step = &steps[i];

                let blocked = workflow
                    .dependencies_of(&step.step_id)
                    .iter()
                    .filter_map(|d| index_of.get(d.as_str()))
                    .find(|&&j| {
                        records[j]
                            .as_ref()
                            .is_some_and(|r| r.status != StepStatus::Completed)
                    });

                let reason = if halted {
                    Some("skipped after an earlier failure (fail-fast)".to_string())
                } else if let Some(&j) = blocked {
                    Some(format!("dependency `{}` did not complete", steps[j].step_id))
                } else {
                    None
                };

                if let Some(reason) = reason {
                    records[i] = Some(skipped(step, &reason));
                    order.push(i);
                    continue;
                }

                match self.resolve_parameters(step, &context) {
                    Ok(parameters) => dispatch.push(Dispatch {
                        index: i,
                        step,
                        parameters,
                    }),
                    Err(reason) => {
                        records[i] = Some(skipped(step, &reason));
                        order.push(i);
                    }
                }
            }

            let snapshot = context.as_map().clone();
            let finished = join_all(
                dispatch
                    .iter()
                    .map(|d| self.run_step(execution_id, d.step, &d.parameters, &snapshot)),
            )
            .await;

            for (d, record) in dispatch.iter().zip(finished) {
                match record.status {
                    StepStatus::Completed => {
                        let output = record.output.clone().unwrap_or(Value::Null);
                        if !context.insert(&d.step.step_id, output) {
                            warn!(%execution_id, step_id = %d.step.step_id, "step output already recorded");
                        }
                    }
                    StepStatus::Failed => {
                        if workflow.error_policy() == ErrorPolicy::FailFast {
                            halted = true;
                        }
                    }
                    StepStatus::Skipped => {}
                }
                records[d.index] = Some(record);
                order.push(d.index);
            }
        }

        let steps_out: Vec<StepRecord> = order
            .into_iter()
            .filter_map(|i| records[i].take())
            .collect();
        let count = |status: StepStatus| steps_out.iter().filter(|r| r.status == status).count();
        let succeeded = count(StepStatus::Completed);
        let failed = count(StepStatus::Failed);
        let skipped_n = count(StepStatus::Skipped);
        let total = steps.len();

        let status = if succeeded == total {
            ExecutionStatus::Completed
        } else if succeeded == 0 {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::PartiallyFailed
        };

        info!(
            %execution_id,
            workflow_id = %workflow.workflow_id(),
            %status,
            succeeded,
            failed,
            skipped = skipped_n,
            "execution finished"
        );

        Ok(ExecutionResult {
            execution_id,
            workflow_id: workflow.workflow_id(),
            status,
            total,
            succeeded,
            failed,
            skipped: skipped_n,
            steps: steps_out,
            context: context.into_map(),
            started_at,
            finished_at: Utc::now(),
        })
    }

    // -- Private helpers ----------------------------------------------------

    fn resolve_parameters(
        &self,
        step: &Step,
        context: &ExecutionContext,
    ) -> std::result::Result<ParamMap, String> {
        step.parameters
            .iter()
            .map(|(k, v)| context.resolve(v).map(|v| (k.clone(), v)))
            .collect()
    }

    async fn run_step(
        &self,
        execution_id: Uuid,
        step: &Step,
        parameters: &ParamMap,
        context: &ParamMap,
    ) -> StepRecord {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();

        let driver = match self.registry.get(&step.driver) {
            Ok(driver) => driver,
            Err(e) => {
                return finish(step, started_at, clock, 0, Err(e.to_string()));
            }
        };

        let timeout = self.config.step_timeout();
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempts = 0;
        let mut last_error = String::new();

        while attempts < max_attempts {
            if attempts > 0 {
                tokio::time::sleep(self.config.retry_delay(attempts - 1)).await;
            }
            attempts += 1;

            debug!(%execution_id, step_id = %step.step_id, attempt = attempts, "dispatching step");
            match tokio::time::timeout(
                timeout,
                driver.execute(&step.operation, parameters, context),
            )
            .await
            {
                Ok(outcome) if outcome.success => {
                    return finish(
                        step,
                        started_at,
                        clock,
                        attempts,
                        Ok(outcome.effective_output()),
                    );
                }
                Ok(outcome) => {
                    last_error = outcome
                        .error
                        .unwrap_or_else(|| "driver reported failure".to_string());
                }
                Err(_) => {
                    last_error = format!("timed out after {}s", timeout.as_secs_f64());
                }
            }

            warn!(
                %execution_id,
                step_id = %step.step_id,
                driver = %step.driver,
                attempt = attempts,
                error = %last_error,
                "step attempt failed"
            );
        }

        finish(step, started_at, clock, attempts, Err(last_error))
    }
}

fn finish(
    step: &Step,
    started_at: DateTime<Utc>,
    clock: std::time::Instant,
    attempts: u32,
    outcome: std::result::Result<Value, String>,
) -> StepRecord {
    let (status, output, error) = match outcome {
        Ok(output) => (StepStatus::Completed, Some(output), None),
        Err(error) => (StepStatus::Failed, None, Some(error)),
    };
    StepRecord {
        step_id: step.step_id.clone(),
        driver: step.driver.clone(),
        operation: step.operation.clone(),
        status,
        attempts,
        output,
        error,
        started_at,
        finished_at: Utc::now(),
        duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

fn skipped(step: &Step, reason: &str) -> StepRecord {
    debug!(step_id = %step.step_id, reason, "step skipped");
    let now = Utc::now();
    StepRecord {
        step_id: step.step_id.clone(),
        driver: step.driver.clone(),
        operation: step.operation.clone(),
        status: StepStatus::Skipped,
        attempts: 0,
        output: None,
        error: Some(reason.to_string()),
        started_at: now,
        finished_at: now,
        duration_ms: 0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use autoflow_drivers::DryRunDriver;
    use autoflow_kernel::OperationSpec;
    use serde_json::json;

    use crate::compiler::{CompileSource, FreeformPlan, WorkflowCompiler};
    use crate::error::IntentError;

    fn svc() -> DryRunDriver {
        DryRunDriver::new(
            "svc",
            "test service",
            vec![
                OperationSpec::new("a", "").optional(["input"]),
                OperationSpec::new("b", "").require(["input"]),
                OperationSpec::new("c", "").optional(["input"]),
            ],
        )
    }

    fn build(driver: DryRunDriver, policy: ErrorPolicy, steps: Value) -> (Arc<DryRunDriver>, Workflow, DriverRegistry) {
        let driver = Arc::new(driver);
        let registry = DriverRegistry::builder()
            .register(driver.clone())
            .unwrap()
            .build();
        let plan: FreeformPlan =
            serde_json::from_value(json!({"name": "test", "steps": steps})).unwrap();
        let wf = WorkflowCompiler::new(registry.clone())
            .with_error_policy(policy)
            .compile(CompileSource::Plan(&plan), &BTreeMap::new());
        assert!(wf.is_valid(), "{}", wf.validation().summary());
        (driver, wf, registry)
    }

    fn engine(registry: DriverRegistry, config: ExecutionConfig) -> ExecutionEngine {
        ExecutionEngine::new(registry, config)
    }

    #[tokio::test]
    async fn passes_outputs_to_dependents() {
        let (driver, wf, registry) = build(
            svc().with_response("a", json!("X")),
            ErrorPolicy::default(),
            json!([
                {"step_id": "A", "driver": "svc", "operation": "a"},
                {"step_id": "B", "driver": "svc", "operation": "b",
                 "parameters": {"input": "step:A.output"}}
            ]),
        );
        let result = engine(registry, ExecutionConfig::default())
            .execute(&wf)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.context["A"], "X");
        let calls = driver.calls();
        assert_eq!(calls[1].parameters["input"], "X");
        assert_eq!(calls[1].context_keys, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn field_and_embedded_references() {
        let (driver, wf, registry) = build(
            svc().with_response("a", json!({"url": "https://x.io", "n": 3})),
            ErrorPolicy::default(),
            json!([
                {"step_id": "A", "driver": "svc", "operation": "a"},
                {"step_id": "B", "driver": "svc", "operation": "b",
                 "parameters": {"input": "got {{step:A.output.url}} x{{step:A.output.n}}"}}
            ]),
        );
        engine(registry, ExecutionConfig::default())
            .execute(&wf)
            .await
            .unwrap();
        assert_eq!(driver.calls()[1].parameters["input"], "got https://x.io x3");
    }

    #[tokio::test]
    async fn continue_on_failure_runs_independent_steps() {
        let (driver, wf, registry) = build(
            svc().with_failure("a", "boom"),
            ErrorPolicy::ContinueOnFailure,
            json!([
                {"step_id": "A", "driver": "svc", "operation": "a"},
                {"step_id": "B", "driver": "svc", "operation": "b",
                 "parameters": {"input": "step:A.output"}},
                {"step_id": "C", "driver": "svc", "operation": "c"}
            ]),
        );
        let result = engine(registry, ExecutionConfig::default())
            .execute(&wf)
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::PartiallyFailed);
        assert_eq!(result.step("A").unwrap().status, StepStatus::Failed);
        assert_eq!(result.step("B").unwrap().status, StepStatus::Skipped);
        assert_eq!(result.step("C").unwrap().status, StepStatus::Completed);
        assert_eq!((result.succeeded, result.failed, result.skipped), (1, 1, 1));
        assert_eq!(driver.call_count("b"), 0);
        assert!(result.step("A").unwrap().error.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn fail_fast_skips_the_rest() {
        let (driver, wf, registry) = build(
            svc().with_failure("a", "boom"),
            ErrorPolicy::FailFast,
            json!([
                {"step_id": "A", "driver": "svc", "operation": "a"},
                {"step_id": "C", "driver": "svc", "operation": "c"}
            ]),
        );
        let result = engine(registry, ExecutionConfig::default())
            .execute(&wf)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.step("C").unwrap().status, StepStatus::Skipped);
        assert_eq!(driver.call_count("c"), 0);
    }

    #[tokio::test]
    async fn sequential_order_follows_declaration() {
        let (driver, wf, registry) = build(
            svc(),
            ErrorPolicy::default(),
            json!([
                {"step_id": "first", "driver": "svc", "operation": "c",
                 "parameters": {"input": "step:second.output"}},
                {"step_id": "second", "driver": "svc", "operation": "a"},
                {"step_id": "third", "driver": "svc", "operation": "c"}
            ]),
        );
        let result = engine(registry, ExecutionConfig::default())
            .execute(&wf)
            .await
            .unwrap();
        let ids: Vec<&str> = result.steps.iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(ids, vec!["second", "first", "third"]);
        let ops: Vec<String> = driver.calls().into_iter().map(|c| c.operation).collect();
        assert_eq!(ops, vec!["a", "c", "c"]);
    }

    #[tokio::test]
    async fn timeout_fails_the_step() {
        let config = ExecutionConfig {
            step_timeout_secs: 1,
            ..ExecutionConfig::default()
        };
        let (_driver, wf, registry) = build(
            svc().with_delay("a", Duration::from_secs(5)),
            ErrorPolicy::default(),
            json!([
                {"step_id": "A", "driver": "svc", "operation": "a"},
                {"step_id": "C", "driver": "svc", "operation": "c"}
            ]),
        );
        let result = engine(registry, config).execute(&wf).await.unwrap();
        let a = result.step("A").unwrap();
        assert_eq!(a.status, StepStatus::Failed);
        assert!(a.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(result.status, ExecutionStatus::PartiallyFailed);
    }

    #[tokio::test]
    async fn retries_recover_flaky_steps() {
        let config = ExecutionConfig {
            max_retries: 2,
            retry_delay_ms: 1,
            ..ExecutionConfig::default()
        };
        let (driver, wf, registry) = build(
            svc().with_flaky("a", 2),
            ErrorPolicy::default(),
            json!([{"step_id": "A", "driver": "svc", "operation": "a"}]),
        );
        let result = engine(registry, config).execute(&wf).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.steps[0].attempts, 3);
        assert_eq!(driver.call_count("a"), 3);
    }

    #[tokio::test]
    async fn concurrent_waves_respect_edges() {
        let config = ExecutionConfig {
            concurrent: true,
            ..ExecutionConfig::default()
        };
        let (driver, wf, registry) = build(
            svc()
                .with_delay("a", Duration::from_millis(50))
                .with_response("a", json!("X")),
            ErrorPolicy::default(),
            json!([
                {"step_id": "A", "driver": "svc", "operation": "a"},
                {"step_id": "C", "driver": "svc", "operation": "c"},
                {"step_id": "B", "driver": "svc", "operation": "b",
                 "parameters": {"input": "step:A.output"}}
            ]),
        );
        let result = engine(registry, config).execute(&wf).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        let b_call = driver.calls().into_iter().find(|c| c.operation == "b").unwrap();
        assert_eq!(b_call.parameters["input"], "X");
    }

    #[tokio::test]
    async fn invalid_workflows_are_refused() {
        let registry = DriverRegistry::builder()
            .register(Arc::new(svc()))
            .unwrap()
            .build();
        let plan: FreeformPlan = serde_json::from_value(json!({
            "name": "bad",
            "steps": [{"step_id": "B", "driver": "svc", "operation": "b"}]
        }))
        .unwrap();
        let wf = WorkflowCompiler::new(registry.clone())
            .compile(CompileSource::Plan(&plan), &BTreeMap::new());
        let err = engine(registry, ExecutionConfig::default())
            .execute(&wf)
            .await
            .unwrap_err();
        assert!(matches!(err, IntentError::Validation { .. }));
    }

    #[test]
    fn context_is_write_once() {
        let mut ctx = ExecutionContext::new();
        assert!(ctx.insert("a", json!(1)));
        assert!(!ctx.insert("a", json!(2)));
        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert!(ctx.resolve(&json!("step:b.output")).is_err());
        assert_eq!(ctx.resolve(&json!(["step:a.output"])).unwrap(), json!([1]));
    }
}
