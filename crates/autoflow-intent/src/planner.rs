//! Freeform plan generation for requests no template covers.
//!
//! The model is shown every registered driver operation with its required
//! and optional parameters and asked for a JSON plan.  The plan is then
//! compiled through the same validator as a template, so an invented driver
//! or a missing parameter is caught before anything runs.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info};

use autoflow_agent::{CompletionModel, Message};
use autoflow_kernel::DriverRegistry;

use crate::compiler::FreeformPlan;
use crate::error::Result;

const PLAN_INSTRUCTIONS: &str = r#"You turn automation requests into workflow plans.

Respond ONLY with a JSON object:
{
  "name": "short workflow name",
  "description": "one sentence",
  "steps": [
    {
      "step_id": "unique_snake_case_id",
      "driver": "driver name from the list",
      "operation": "operation name from the list",
      "parameters": {"param": "value"},
      "depends_on": ["earlier_step_id"]
    }
  ]
}

Rules:
- Use only the drivers and operations listed below.
- Supply every required parameter.  Use "{{name}}" for a value the user has
  not given yet, where name is a short snake_case label.
- To use an earlier step's result, write "step:<step_id>.output" (or
  "step:<step_id>.output.<field>") as the parameter value.
- Do not include explanations or markdown."#;

/// Asks a completion model for a [`FreeformPlan`].
pub struct PlanGenerator {
    model: Arc<dyn CompletionModel>,
}

impl PlanGenerator {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    /// Generate a plan for `utterance` using only operations in `registry`.
    pub async fn plan(
        &self,
        utterance: &str,
        known: &BTreeMap<String, String>,
        registry: &DriverRegistry,
    ) -> Result<FreeformPlan> {
        let system = system_prompt(registry);
        let mut request = utterance.to_string();
        if !known.is_empty() {
            request.push_str("\n\nKnown values:");
            for (k, v) in known {
                let _ = write!(request, "\n- {k}: {v}");
            }
        }

        debug!(model = self.model.model_name(), "requesting freeform plan");
        let raw = self
            .model
            .complete(&system, &[Message::user(request)])
            .await?;
        let plan = FreeformPlan::from_llm_json(&raw)?;

        info!(name = %plan.name, steps = plan.steps.len(), "freeform plan generated");
        Ok(plan)
    }
}

/// The instructions followed by a catalog of every driver operation.
pub fn system_prompt(registry: &DriverRegistry) -> String {
    let mut prompt = String::from(PLAN_INSTRUCTIONS);
    prompt.push_str("\n\nAvailable drivers:\n");
    for info in registry.list() {
        let _ = writeln!(prompt, "- {}: {}", info.name, info.description);
        for op in &info.operations {
            let _ = write!(prompt, "  - {}", op.name);
            if !op.required_params.is_empty() {
                let _ = write!(prompt, " (required: {})", op.required_params.join(", "));
            }
            if !op.optional_params.is_empty() {
                let _ = write!(prompt, " (optional: {})", op.optional_params.join(", "));
            }
            prompt.push('\n');
        }
    }
    prompt
}

impl std::fmt::Debug for PlanGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanGenerator")
            .field("model", &self.model.model_name())
            .finish()
    }
}
