//! Compiled workflow representation.
//!
//! A [`Workflow`] is the typed, versioned document the compiler produces and
//! the execution engine consumes.  JSON is only its storage format:
//! [`Workflow::to_json`] stamps the schema version and
//! [`Workflow::from_json`] rejects any other.
//!
//! Workflows are immutable once built.  Changing parameters means compiling
//! a new one.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use autoflow_kernel::ParamMap;

use crate::error::{IntentError, Result};

/// Current serialized schema version.
pub const SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Steps and policy
// ---------------------------------------------------------------------------

/// One unit of work bound to a driver operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub driver: String,
    pub operation: String,
    #[serde(default)]
    pub parameters: ParamMap,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Step {
    /// Ids of every step this step's parameters reference at run time.
    pub fn referenced_steps(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for value in self.parameters.values() {
            for r in StepRef::references(value) {
                if !ids.contains(&r.step_id) {
                    ids.push(r.step_id);
                }
            }
        }
        ids
    }
}

/// What the engine does after a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Keep running steps that do not depend on the failed one.
    #[default]
    ContinueOnFailure,
    /// Skip every remaining step after the first failure.
    FailFast,
}

impl ErrorPolicy {
    pub fn from_continue_flag(continue_on_failure: bool) -> Self {
        if continue_on_failure {
            Self::ContinueOnFailure
        } else {
            Self::FailFast
        }
    }
}

// ---------------------------------------------------------------------------
// Validation report
// ---------------------------------------------------------------------------

/// Outcome of structural validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    /// Parameter names the user still has to supply, in first-seen order.
    pub missing_params: Vec<String>,
    /// Structural problems (unknown drivers, cycles, bad references).
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub(crate) fn from_parts(missing_params: Vec<String>, errors: Vec<String>) -> Self {
        Self {
            is_valid: missing_params.is_empty() && errors.is_empty(),
            missing_params,
            errors,
        }
    }

    /// One-line description for logs and error messages.
    pub fn summary(&self) -> String {
        if self.is_valid {
            return "valid".to_string();
        }
        let mut parts = self.errors.clone();
        if !self.missing_params.is_empty() {
            parts.push(format!(
                "missing parameters: {}",
                self.missing_params.join(", ")
            ));
        }
        parts.join("; ")
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A compiled workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    schema_version: u32,
    workflow_id: Uuid,
    name: String,
    template_id: Option<String>,
    steps: Vec<Step>,
    /// Every step id mapped to the ids it must wait for.
    dependencies: BTreeMap<String, Vec<String>>,
    error_policy: ErrorPolicy,
    /// The user parameters the workflow was compiled with.
    parameters: BTreeMap<String, String>,
    validation: ValidationReport,
    created_at: DateTime<Utc>,
}

impl Workflow {
    pub(crate) fn new(
        name: String,
        template_id: Option<String>,
        steps: Vec<Step>,
        error_policy: ErrorPolicy,
        parameters: BTreeMap<String, String>,
    ) -> Self {
        let dependencies = dependency_map(&steps);
        Self {
            schema_version: SCHEMA_VERSION,
            workflow_id: Uuid::now_v7(),
            name,
            template_id,
            steps,
            dependencies,
            error_policy,
            parameters,
            validation: ValidationReport::default(),
            created_at: Utc::now(),
        }
    }

    pub(crate) fn with_validation(mut self, report: ValidationReport) -> Self {
        self.validation = report;
        self
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template_id(&self) -> Option<&str> {
        self.template_id.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn dependencies(&self) -> &BTreeMap<String, Vec<String>> {
        &self.dependencies
    }

    /// Dependencies of one step; empty for unknown ids.
    pub fn dependencies_of(&self, step_id: &str) -> &[String] {
        self.dependencies
            .get(step_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn validation(&self) -> &ValidationReport {
        &self.validation
    }

    pub fn is_valid(&self) -> bool {
        self.validation.is_valid
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from storage, rejecting unknown schema versions.
    pub fn from_json(json: &str) -> Result<Self> {
        let workflow: Self = serde_json::from_str(json)?;
        if workflow.schema_version != SCHEMA_VERSION {
            return Err(IntentError::UnsupportedSchemaVersion {
                found: workflow.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(workflow)
    }
}

/// `depends_on` plus runtime references for every step, sorted and deduped.
fn dependency_map(steps: &[Step]) -> BTreeMap<String, Vec<String>> {
    steps
        .iter()
        .map(|step| {
            let mut deps: Vec<String> = step.depends_on.clone();
            deps.extend(step.referenced_steps());
            deps.sort();
            deps.dedup();
            (step.step_id.clone(), deps)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Runtime references
// ---------------------------------------------------------------------------

/// A deferred `step:<id>.output[.field]` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepRef {
    pub step_id: String,
    /// Top-level field of an object output, if selected.
    pub field: Option<String>,
}

impl StepRef {
    /// Parse a whole-value reference such as `step:fetch.output.url`.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim().strip_prefix("step:")?;
        let (step_id, tail) = rest.split_once(".output")?;
        if step_id.is_empty() || !step_id.chars().all(is_id_char) {
            return None;
        }
        let field = match tail {
            "" => None,
            t => {
                let field = t.strip_prefix('.')?;
                if field.is_empty() || !field.chars().all(is_id_char) {
                    return None;
                }
                Some(field.to_string())
            }
        };
        Some(Self {
            step_id: step_id.to_string(),
            field,
        })
    }

    /// Every `{{step:...}}` reference embedded in a longer string, with the
    /// byte range of its braces.
    pub fn embedded(text: &str) -> Vec<(std::ops::Range<usize>, Self)> {
        let mut out = Vec::new();
        let mut pos = 0;
        while let Some(offset) = text[pos..].find("{{") {
            let start = pos + offset;
            let Some(close) = text[start + 2..].find("}}") else {
                break;
            };
            let end = start + 2 + close + 2;
            if let Some(r) = Self::parse(&text[start + 2..end - 2]) {
                out.push((start..end, r));
            }
            pos = end;
        }
        out
    }

    /// All references inside `value`, recursing through arrays and objects.
    pub fn references(value: &Value) -> Vec<Self> {
        let mut out = Vec::new();
        collect_refs(value, &mut out);
        out
    }
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step:{}.output", self.step_id)?;
        if let Some(field) = &self.field {
            write!(f, ".{field}")?;
        }
        Ok(())
    }
}

fn collect_refs(value: &Value, out: &mut Vec<StepRef>) {
    match value {
        Value::String(s) => {
            if let Some(r) = StepRef::parse(s) {
                out.push(r);
            } else {
                out.extend(StepRef::embedded(s).into_iter().map(|(_, r)| r));
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_refs(v, out)),
        _ => {}
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(id: &str, deps: &[&str], params: Value) -> Step {
        Step {
            step_id: id.into(),
            driver: "d".into(),
            operation: "op".into(),
            parameters: params.as_object().cloned().unwrap_or_default(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn parses_whole_references() {
        assert_eq!(
            StepRef::parse("step:fetch.output"),
            Some(StepRef {
                step_id: "fetch".into(),
                field: None
            })
        );
        assert_eq!(
            StepRef::parse("step:fetch.output.url").unwrap().field.as_deref(),
            Some("url")
        );
        assert!(StepRef::parse("step:.output").is_none());
        assert!(StepRef::parse("step:a.outputs").is_none());
        assert!(StepRef::parse("see step:a.output").is_none());
    }

    #[test]
    fn finds_embedded_references() {
        let text = "Report {{step:export.output.id}} for {{recipient}} via {{ step:b.output }}";
        let refs = StepRef::embedded(text);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].1.step_id, "export");
        assert_eq!(&text[refs[0].0.clone()], "{{step:export.output.id}}");
        assert_eq!(refs[1].1.step_id, "b");
    }

    #[test]
    fn dependencies_include_references() {
        let steps = vec![
            step("a", &[], json!({})),
            step("b", &[], json!({"x": "step:a.output", "y": ["{{step:a.output}}"]})),
            step("c", &["a"], json!({"nested": {"z": "step:b.output.id"}})),
        ];
        let wf = Workflow::new("t".into(), None, steps, ErrorPolicy::default(), BTreeMap::new());
        assert_eq!(wf.dependencies_of("a"), &[] as &[String]);
        assert_eq!(wf.dependencies_of("b"), &["a".to_string()]);
        assert_eq!(wf.dependencies_of("c"), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn json_round_trip_checks_version() {
        let wf = Workflow::new(
            "t".into(),
            Some("tpl".into()),
            vec![step("a", &[], json!({"k": 1}))],
            ErrorPolicy::FailFast,
            BTreeMap::new(),
        );
        let json = wf.to_json().unwrap();
        assert_eq!(Workflow::from_json(&json).unwrap(), wf);

        let bumped = json.replace("\"schema_version\":1", "\"schema_version\":9");
        let err = Workflow::from_json(&bumped).unwrap_err();
        assert!(matches!(
            err,
            IntentError::UnsupportedSchemaVersion { found: 9, .. }
        ));
    }

    #[test]
    fn report_summary() {
        let report = ValidationReport::from_parts(
            vec!["name".into(), "project".into()],
            vec!["unknown driver `x`".into()],
        );
        assert!(!report.is_valid);
        assert_eq!(
            report.summary(),
            "unknown driver `x`; missing parameters: name, project"
        );
        assert_eq!(ValidationReport::from_parts(vec![], vec![]).summary(), "valid");
    }
}
