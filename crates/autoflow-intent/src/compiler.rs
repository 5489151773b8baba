//! Workflow compiler and validator.
//!
//! Compilation binds user parameters into a template's (or plan's) step
//! skeletons and hands the result to [`WorkflowCompiler::validate`]:
//!
//! - `{{name}}` takes the parameter `name`.
//! - `{{name|text}}` falls back to `text` when `name` is absent.
//! - An unbound placeholder in a required driver parameter is kept and its
//!   name reported as missing; an unbound optional parameter is dropped.
//! - `step:<id>.output` references are left alone for the engine.
//!
//! A workflow that fails validation is still returned (with its report) so
//! the caller can ask a clarifying question, but it can never be executed.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use autoflow_agent::strip_code_fences;
use autoflow_kernel::{DriverRegistry, ParamMap};

use crate::error::{IntentError, Result};
use crate::template::{StepSpec, Template};
use crate::workflow::{ErrorPolicy, Step, StepRef, ValidationReport, Workflow};

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// A model-generated plan for requests no template covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeformPlan {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl FreeformPlan {
    /// Parse a model answer, tolerating markdown code fences.
    pub fn from_llm_json(raw: &str) -> Result<Self> {
        serde_json::from_str(strip_code_fences(raw)).map_err(|e| IntentError::InvalidPlan {
            reason: e.to_string(),
        })
    }
}

/// What a workflow is compiled from.
#[derive(Debug, Clone, Copy)]
pub enum CompileSource<'a> {
    Template(&'a Template),
    Plan(&'a FreeformPlan),
}

impl CompileSource<'_> {
    fn name(&self) -> &str {
        match self {
            Self::Template(t) => &t.name,
            Self::Plan(p) => &p.name,
        }
    }

    fn template_id(&self) -> Option<String> {
        match self {
            Self::Template(t) => Some(t.id.clone()),
            Self::Plan(_) => None,
        }
    }

    fn steps(&self) -> &[StepSpec] {
        match self {
            Self::Template(t) => &t.steps,
            Self::Plan(p) => &p.steps,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowCompiler
// ---------------------------------------------------------------------------

/// Binds parameters into step skeletons and validates the result against the
/// driver registry.
#[derive(Debug, Clone)]
pub struct WorkflowCompiler {
    registry: DriverRegistry,
    error_policy: ErrorPolicy,
}

impl WorkflowCompiler {
    pub fn new(registry: DriverRegistry) -> Self {
        Self {
            registry,
            error_policy: ErrorPolicy::default(),
        }
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Compile `source` with `params`.  The returned workflow carries its
    /// validation report; check [`Workflow::is_valid`] before running it.
    pub fn compile(
        &self,
        source: CompileSource<'_>,
        params: &BTreeMap<String, String>,
    ) -> Workflow {
        let steps = source
            .steps()
            .iter()
            .map(|spec| self.bind_step(spec, params))
            .collect();

        let workflow = Workflow::new(
            source.name().to_string(),
            source.template_id(),
            steps,
            self.error_policy,
            params.clone(),
        );
        let report = self.validate(&workflow);

        info!(
            workflow_id = %workflow.workflow_id(),
            name = workflow.name(),
            steps = workflow.steps().len(),
            valid = report.is_valid,
            "workflow compiled"
        );
        workflow.with_validation(report)
    }

    /// Like [`compile`](Self::compile) but an invalid result is an error.
    pub fn compile_checked(
        &self,
        source: CompileSource<'_>,
        params: &BTreeMap<String, String>,
    ) -> Result<Workflow> {
        let workflow = self.compile(source, params);
        ensure_valid(&workflow)?;
        Ok(workflow)
    }

    /// Re-run validation against the current registry.  Used before firing a
    /// stored workflow, whose drivers may have changed since it was saved.
    pub fn revalidate(&self, workflow: &Workflow) -> Result<()> {
        let report = self.validate(workflow);
        if report.is_valid {
            Ok(())
        } else {
            Err(IntentError::Validation {
                workflow_id: workflow.workflow_id(),
                report,
            })
        }
    }

    /// Structural validation.
    pub fn validate(&self, workflow: &Workflow) -> ValidationReport {
        let steps = workflow.steps();
        let mut errors: Vec<String> = Vec::new();
        let mut missing: Vec<String> = Vec::new();

        if steps.is_empty() {
            errors.push("workflow has no steps".to_string());
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for step in steps {
            if !seen.insert(step.step_id.as_str()) {
                errors.push(format!("duplicate step id `{}`", step.step_id));
            }
        }

        for step in steps {
            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    errors.push(format!(
                        "step `{}` depends on unknown step `{dep}`",
                        step.step_id
                    ));
                }
            }
            for r in step.referenced_steps() {
                if !seen.contains(r.as_str()) {
                    errors.push(format!(
                        "step `{}` references unknown step `{r}`",
                        step.step_id
                    ));
                }
            }

            if !self.registry.contains(&step.driver) {
                errors.push(format!(
                    "step `{}`: unknown driver `{}`",
                    step.step_id, step.driver
                ));
                continue;
            }
            let Ok(required) = self.registry.required_params(&step.driver, &step.operation)
            else {
                errors.push(format!(
                    "step `{}`: driver `{}` does not support operation `{}`",
                    step.step_id, step.driver, step.operation
                ));
                continue;
            };

            for param in required {
                for name in missing_names(param, step.parameters.get(param)) {
                    if !missing.contains(&name) {
                        missing.push(name);
                    }
                }
            }
        }

        if let Some(cycle) = find_cycle(workflow) {
            errors.push(format!("circular dependency detected: {}", cycle.join(" -> ")));
        }

        let report = ValidationReport::from_parts(missing, errors);
        if !report.is_valid {
            debug!(
                workflow_id = %workflow.workflow_id(),
                summary = %report.summary(),
                "workflow failed validation"
            );
        }
        report
    }

    // -- Private helpers ----------------------------------------------------

    fn bind_step(&self, spec: &StepSpec, params: &BTreeMap<String, String>) -> Step {
        let required: &[String] = self
            .registry
            .required_params(&spec.driver, &spec.operation)
            .unwrap_or(&[]);

        let mut parameters = ParamMap::new();
        for (key, raw) in &spec.parameters {
            let (value, unbound) = bind_value(raw, params);
            if unbound && !required.contains(key) {
                continue;
            }
            parameters.insert(key.clone(), value);
        }

        // Required parameters the skeleton never mentions can still come
        // straight from the user's parameters.
        for key in required {
            if !parameters.contains_key(key)
                && let Some(v) = params.get(key)
            {
                parameters.insert(key.clone(), Value::String(v.clone()));
            }
        }

        Step {
            step_id: spec.step_id.clone(),
            driver: spec.driver.clone(),
            operation: spec.operation.clone(),
            parameters,
            depends_on: spec.depends_on.clone(),
        }
    }
}

/// Error out on an invalid workflow.
pub fn ensure_valid(workflow: &Workflow) -> Result<()> {
    if workflow.is_valid() {
        Ok(())
    } else {
        Err(IntentError::Validation {
            workflow_id: workflow.workflow_id(),
            report: workflow.validation().clone(),
        })
    }
}

/// A single question asking for whatever the report lacks; `None` when the
/// report is valid.  Missing names are sorted so the wording depends only on
/// the set.
pub fn clarifying_question(report: &ValidationReport) -> Option<String> {
    if report.is_valid {
        return None;
    }
    if report.missing_params.is_empty() {
        return Some(format!(
            "I couldn't build that workflow: {}. Could you rephrase the request?",
            report.errors.join("; ")
        ));
    }

    let mut names: Vec<String> = report
        .missing_params
        .iter()
        .map(|p| p.replace('_', " "))
        .collect();
    names.sort();
    names.dedup();

    let list = match names.as_slice() {
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
        [] => String::new(),
    };
    Some(format!(
        "I need a bit more information before I can run this. What is the {list}?"
    ))
}

// ---------------------------------------------------------------------------
// Placeholder binding
// ---------------------------------------------------------------------------

/// A `{{key}}` or `{{key|default}}` occurrence.
struct Placeholder<'a> {
    range: std::ops::Range<usize>,
    key: &'a str,
    default: Option<&'a str>,
}

/// Compile-time placeholders in `text`; runtime `{{step:...}}` references
/// and malformed braces are not placeholders.
fn placeholders(text: &str) -> Vec<Placeholder<'_>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(offset) = text[pos..].find("{{") {
        let start = pos + offset;
        let Some(close) = text[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + close + 2;
        let inner = &text[start + 2..end - 2];
        let (key, default) = match inner.split_once('|') {
            Some((k, d)) => (k.trim(), Some(d)),
            None => (inner.trim(), None),
        };
        if is_placeholder_key(key) {
            out.push(Placeholder {
                range: start..end,
                key,
                default,
            });
        }
        pos = end;
    }
    out
}

fn is_placeholder_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Bind placeholders inside `value`.  Returns the bound value and whether any
/// placeholder stayed unbound.
fn bind_value(value: &Value, params: &BTreeMap<String, String>) -> (Value, bool) {
    match value {
        Value::String(s) => {
            let (bound, unbound) = bind_str(s, params);
            (Value::String(bound), unbound)
        }
        Value::Array(items) => {
            let mut unbound = false;
            let items = items
                .iter()
                .map(|v| {
                    let (v, u) = bind_value(v, params);
                    unbound |= u;
                    v
                })
                .collect();
            (Value::Array(items), unbound)
        }
        Value::Object(map) => {
            let mut unbound = false;
            let map = map
                .iter()
                .map(|(k, v)| {
                    let (v, u) = bind_value(v, params);
                    unbound |= u;
                    (k.clone(), v)
                })
                .collect();
            (Value::Object(map), unbound)
        }
        other => (other.clone(), false),
    }
}

fn bind_str(text: &str, params: &BTreeMap<String, String>) -> (String, bool) {
    let found = placeholders(text);
    if found.is_empty() {
        return (text.to_string(), false);
    }

    let mut out = String::with_capacity(text.len());
    let mut unbound = false;
    let mut last = 0;
    for p in found {
        out.push_str(&text[last..p.range.start]);
        match params.get(p.key).map(String::as_str).or(p.default) {
            Some(v) => out.push_str(v),
            None => {
                unbound = true;
                out.push_str(&text[p.range.clone()]);
            }
        }
        last = p.range.end;
    }
    out.push_str(&text[last..]);
    (out, unbound)
}

/// Missing parameter names for one required parameter value.
fn missing_names(param: &str, value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => vec![param.to_string()],
        Some(Value::String(s)) if StepRef::parse(s).is_some() => Vec::new(),
        Some(Value::String(s)) if s.trim().is_empty() => vec![param.to_string()],
        Some(Value::String(s)) => placeholders(s)
            .into_iter()
            .map(|p| p.key.to_string())
            .collect(),
        Some(other) => {
            let mut names = Vec::new();
            collect_unbound(other, &mut names);
            names
        }
    }
}

fn collect_unbound(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(placeholders(s).into_iter().map(|p| p.key.to_string())),
        Value::Array(items) => items.iter().for_each(|v| collect_unbound(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_unbound(v, out)),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// The first dependency cycle found, as a closed path (`a -> b -> a`).
fn find_cycle(workflow: &Workflow) -> Option<Vec<String>> {
    let ids: Vec<&str> = workflow.steps().iter().map(|s| s.step_id.as_str()).collect();
    let mut marks: HashMap<&str, Mark> = ids.iter().map(|id| (*id, Mark::Unvisited)).collect();
    let mut stack: Vec<&str> = Vec::new();

    for id in &ids {
        if marks.get(id) == Some(&Mark::Unvisited)
            && let Some(cycle) = visit(workflow, id, &mut marks, &mut stack)
        {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    workflow: &'a Workflow,
    id: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    marks.insert(id, Mark::OnStack);
    stack.push(id);

    for dep in workflow.dependencies_of(id) {
        match marks.get(dep.as_str()).copied() {
            Some(Mark::OnStack) => {
                let from = stack.iter().position(|s| *s == dep.as_str()).unwrap_or(0);
                let mut cycle: Vec<String> = stack[from..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            Some(Mark::Unvisited) => {
                if let Some(cycle) = visit(workflow, dep, marks, stack) {
                    return Some(cycle);
                }
            }
            // Done, or unknown (reported separately).
            _ => {}
        }
    }

    stack.pop();
    marks.insert(id, Mark::Done);
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
