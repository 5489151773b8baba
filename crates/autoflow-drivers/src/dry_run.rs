//! Dry-run driver.
//!
//! A [`DryRunDriver`] declares an operation table like any real integration
//! but never leaves the process: each call is recorded and answered with a
//! canned or synthesized response.  Services without configured credentials
//! are registered this way, and tests use it to script failures, delays, and
//! flaky calls.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use autoflow_kernel::{Driver, DriverOutcome, OperationSpec, ParamMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DriverError, Result};

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCall {
    pub operation: String,
    pub parameters: ParamMap,
    /// Step ids visible in the execution context at call time.
    pub context_keys: Vec<String>,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct Script {
    responses: HashMap<String, Value>,
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    /// Remaining forced failures before an operation starts succeeding.
    flaky: HashMap<String, u32>,
}

/// Driver that records calls instead of contacting a service.
pub struct DryRunDriver {
    name: String,
    description: String,
    operations: Vec<OperationSpec>,
    script: Mutex<Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl DryRunDriver {
    /// Create a driver named `name` declaring `operations`.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        operations: Vec<OperationSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            operations,
            script: Mutex::new(Script::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer `operation` with a fixed output.
    #[must_use]
    pub fn with_response(self, operation: &str, output: Value) -> Self {
        self.script_mut(|s| {
            s.responses.insert(operation.to_string(), output);
        });
        self
    }

    /// Make every call to `operation` fail with `error`.
    #[must_use]
    pub fn with_failure(self, operation: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        self.script_mut(|s| {
            s.failures.insert(operation.to_string(), error);
        });
        self
    }

    /// Sleep before answering `operation`.
    #[must_use]
    pub fn with_delay(self, operation: &str, delay: Duration) -> Self {
        self.script_mut(|s| {
            s.delays.insert(operation.to_string(), delay);
        });
        self
    }

    /// Fail the first `times` calls to `operation`, then succeed.
    #[must_use]
    pub fn with_flaky(self, operation: &str, times: u32) -> Self {
        self.script_mut(|s| {
            s.flaky.insert(operation.to_string(), times);
        });
        self
    }

    /// Snapshot of every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Number of calls received for `operation`.
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| c.operation == operation).count()
    }

    fn script_mut(&self, f: impl FnOnce(&mut Script)) {
        if let Ok(mut script) = self.script.lock() {
            f(&mut script);
        }
    }

    fn check_params(&self, operation: &str, parameters: &ParamMap) -> Result<()> {
        let spec = self
            .operations
            .iter()
            .find(|op| op.name == operation)
            .ok_or_else(|| DriverError::OperationNotFound {
                driver: self.name.clone(),
                operation: operation.to_string(),
            })?;

        let missing: Vec<&str> = spec
            .required_params
            .iter()
            .filter(|p| parameters.get(p.as_str()).is_none_or(Value::is_null))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DriverError::InvalidParams {
                operation: operation.to_string(),
                reason: format!("missing {}", missing.join(", ")),
            })
        }
    }

    /// Decide the scripted answer for one call.
    fn answer(&self, operation: &str, parameters: &ParamMap) -> Result<Value> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| DriverError::ExecutionFailed {
                operation: operation.to_string(),
                reason: "dry-run script lock poisoned".into(),
            })?;

        if let Some(error) = script.failures.get(operation) {
            return Err(DriverError::ExecutionFailed {
                operation: operation.to_string(),
                reason: error.clone(),
            });
        }

        if let Some(remaining) = script.flaky.get_mut(operation)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(DriverError::ExecutionFailed {
                operation: operation.to_string(),
                reason: "transient failure".into(),
            });
        }

        if let Some(response) = script.responses.get(operation) {
            return Ok(response.clone());
        }

        Ok(json!({
            "id": Uuid::now_v7().to_string(),
            "driver": self.name,
            "operation": operation,
            "status": "accepted",
            "parameters": parameters,
        }))
    }
}

#[async_trait]
impl Driver for DryRunDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn supported_operations(&self) -> Vec<OperationSpec> {
        self.operations.clone()
    }

    async fn execute(&self, operation: &str, parameters: &ParamMap, context: &ParamMap)
    -> DriverOutcome {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                operation: operation.to_string(),
                parameters: parameters.clone(),
                context_keys: context.keys().cloned().collect(),
                at: Utc::now(),
            });
        }

        let delay = self
            .script
            .lock()
            .ok()
            .and_then(|s| s.delays.get(operation).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self
            .check_params(operation, parameters)
            .and_then(|()| self.answer(operation, parameters));

        match result {
            Ok(output) => {
                info!(driver = %self.name, operation, "dry-run call accepted");
                DriverOutcome::ok(output)
            }
            Err(e) => {
                debug!(driver = %self.name, operation, error = %e, "dry-run call failed");
                DriverOutcome::failed(e.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
