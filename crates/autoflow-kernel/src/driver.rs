//! The uniform driver contract.
//!
//! Every third-party action integration (email, project board, document
//! store, payments, HTTP, ...) implements the [`Driver`] trait.  The engine
//! never depends on a driver's internals: it only sees the declared
//! [`OperationSpec`] table and the [`DriverOutcome`] returned by
//! [`Driver::execute`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters and context are passed to drivers as JSON objects.
pub type ParamMap = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// An operation a driver declares it can perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Machine-readable operation name (e.g. `send`, `create_task`).
    pub name: String,
    /// Human-readable description of the operation.
    #[serde(default)]
    pub description: String,
    /// Parameters that must be present before the operation can run.
    #[serde(default)]
    pub required_params: Vec<String>,
    /// Parameters the operation understands but does not require.
    #[serde(default)]
    pub optional_params: Vec<String>,
}

impl OperationSpec {
    /// Create an operation with no declared parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required_params: Vec::new(),
            optional_params: Vec::new(),
        }
    }

    /// Declare the required parameters of this operation.
    pub fn require<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Declare the optional parameters of this operation.
    pub fn optional<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_params = params.into_iter().map(Into::into).collect();
        self
    }
}

/// The result of a single driver call.
///
/// Mirrors the wire contract `{success, result, output, error}`.  `output`
/// is what downstream steps see through `step:<id>.output`; drivers that
/// only fill `result` have it used as the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverOutcome {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Raw result payload from the backing service.
    #[serde(default)]
    pub result: Option<Value>,
    /// Value exposed to later steps.
    #[serde(default)]
    pub output: Option<Value>,
    /// Human-readable error when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
}

impl DriverOutcome {
    /// A successful outcome whose result and output are the same value.
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            result: Some(output.clone()),
            output: Some(output),
            error: None,
        }
    }

    /// A successful outcome with distinct raw result and exposed output.
    pub fn ok_with(result: Value, output: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            output: Some(output),
            error: None,
        }
    }

    /// A failed outcome.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            output: None,
            error: Some(error.into()),
        }
    }

    /// The value downstream steps observe: `output`, else `result`, else null.
    pub fn effective_output(&self) -> Value {
        self.output
            .clone()
            .or_else(|| self.result.clone())
            .unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// The universal driver interface.
///
/// Drivers are registered once at startup in the
/// [`DriverRegistry`](crate::registry::DriverRegistry) and looked up by
/// [`Driver::name`].  Adding a driver never requires touching engine code.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Unique registry key for this driver (e.g. `email`, `tasks`).
    fn name(&self) -> &str;

    /// Short description shown in status listings.
    fn description(&self) -> &str {
        ""
    }

    /// The operations this driver supports, with their parameter contracts.
    fn supported_operations(&self) -> Vec<OperationSpec>;

    /// Execute `operation` with resolved `parameters`.
    ///
    /// `context` is a read-only snapshot of the outputs produced so far in
    /// the current run, keyed by step id.  Failures are reported through
    /// [`DriverOutcome::failed`] rather than a Rust error so that one bad
    /// call never aborts the caller.
    async fn execute(&self, operation: &str, parameters: &ParamMap, context: &ParamMap)
    -> DriverOutcome;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
