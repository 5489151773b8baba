//! The per-message path through one agent instance.
//!
//! ```text
//! message ─► cancel? ─► open selection? ─► pending workflow? ─► classify
//!                                                               │
//!            conversation ◄── not automation ◄──────────────────┤
//!                                                               ▼
//!                          match templates ─► pick / offer / plan ─► compile
//!                                                                      │
//!                    needs input (pending) ◄── missing params ◄────────┤
//!                                                                      ▼
//!                                        schedule trigger  or  execute + log
//! ```
//!
//! Everything that mutates conversation state goes through the
//! `&mut InstanceState` handed in by the service, which holds the
//! instance's lock for the whole call.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use autoflow_intent::{
    CompileSource, ExecutionEngine, Intent, IntentClassifier, PlanGenerator, Template,
    TemplateMatcher, TriggerScheduler, TriggerType, Workflow, WorkflowCompiler,
    WorkflowRepository, clarifying_question,
};

use crate::instance::{InstanceKey, InstanceState, PendingSource, PendingWorkflow, SelectionState};
use crate::response::{ApiResponse, ResponseStatus, TemplateOption};

/// Replies that abandon a pending workflow or selection.
const CANCEL_WORDS: &[&str] = &["cancel", "stop", "never mind", "nevermind", "forget it"];

const CONVERSATION_REPLY: &str = "I can automate things like sending emails, creating tasks, \
     drafting content, exporting reports, and scheduled reminders. Tell me what you'd like done.";

const NO_MATCH_REPLY: &str =
    "I couldn't find a workflow for that request. Could you describe it differently?";

/// Shared, read-only machinery every instance runs messages through.
pub struct MessagePipeline {
    pub(crate) classifier: Arc<IntentClassifier>,
    pub(crate) matcher: TemplateMatcher,
    pub(crate) compiler: WorkflowCompiler,
    pub(crate) engine: ExecutionEngine,
    pub(crate) planner: Option<PlanGenerator>,
    pub(crate) workflows: Arc<dyn WorkflowRepository>,
    pub(crate) scheduler: Arc<TriggerScheduler>,
    pub(crate) context_window: usize,
}

impl MessagePipeline {
    /// Handle one user message and record both turns in the instance history.
    pub async fn handle(&self, key: &InstanceKey, state: &mut InstanceState, text: &str) -> ApiResponse {
        let recent = state.history.recent(self.context_window);
        state.history.push_user(text);
        let response = self.respond(key, state, text.trim(), &recent).await;
        state.history.push_assistant(response.message.clone());
        response
    }

    async fn respond(
        &self,
        key: &InstanceKey,
        state: &mut InstanceState,
        text: &str,
        recent: &[autoflow_agent::Message],
    ) -> ApiResponse {
        if is_cancel(text) {
            if state.pending.is_some() || state.selection.is_some() {
                state.reset_flow();
                return ApiResponse::new(ResponseStatus::Cancelled, "Okay, I've dropped that.");
            }
            return ApiResponse::new(ResponseStatus::Conversation, "There's nothing to cancel.");
        }

        // An open template choice.
        if let Some(selection) = state.selection.take() {
            if let Some(index) = pick_option(text, &selection.options) {
                let template = Arc::clone(&selection.options[index]);
                info!(%key, template_id = %template.id, "template selected");
                return self
                    .compile_and_run(key, state, PendingSource::Template(template), selection.parameters)
                    .await;
            }
            debug!(%key, "reply is not a selection, treating as a new request");
        }

        // A workflow waiting for parameters.
        if let Some(mut pending) = state.pending.take() {
            let mut filled = parse_follow_up(text, &pending.missing);
            for (k, v) in self.classifier.extract(text) {
                if pending.missing.contains(&k) {
                    filled.entry(k).or_insert(v);
                }
            }

            if !filled.is_empty() {
                debug!(%key, filled = ?filled.keys().collect::<Vec<_>>(), "pending parameters supplied");
                pending.parameters.extend(filled);
                return self
                    .compile_and_run(key, state, pending.source, pending.parameters)
                    .await;
            }

            let intent = self.classifier.classify(text, recent).await;
            if !intent.is_automation {
                let question = format!(
                    "I still need the {} to run \"{}\". Reply with `name: value`, or say cancel.",
                    pending.missing.join(", ").replace('_', " "),
                    pending.source.name()
                );
                let missing = pending.missing.clone();
                state.pending = Some(pending);
                return ApiResponse::new(ResponseStatus::NeedsInput, question).with_missing(missing);
            }
            info!(%key, "new request replaces pending workflow");
            return self.route_intent(key, state, text, intent).await;
        }

        let intent = self.classifier.classify(text, recent).await;
        self.route_intent(key, state, text, intent).await
    }

    async fn route_intent(
        &self,
        key: &InstanceKey,
        state: &mut InstanceState,
        text: &str,
        intent: Intent,
    ) -> ApiResponse {
        if !intent.is_automation {
            debug!(%key, confidence = intent.confidence, "conversational message");
            return ApiResponse::new(ResponseStatus::Conversation, CONVERSATION_REPLY);
        }

        let matches = self.matcher.candidates(&intent);
        let params = intent.extracted_parameters.clone();

        if self.matcher.should_auto_select(&intent, &matches) || matches.len() == 1 {
            let template = Arc::clone(&matches[0].template);
            info!(
                %key,
                template_id = %template.id,
                score = matches[0].score,
                "template chosen"
            );
            return self
                .compile_and_run(key, state, PendingSource::Template(template), params)
                .await;
        }

        if !matches.is_empty() {
            let options: Vec<TemplateOption> = matches
                .iter()
                .enumerate()
                .map(|(i, m)| TemplateOption {
                    index: i + 1,
                    template_id: m.template.id.clone(),
                    name: m.template.name.clone(),
                    description: m.template.description.clone(),
                    score: m.score,
                })
                .collect();
            let mut message = String::from("I found a few workflows that could fit:");
            for option in &options {
                message.push_str(&format!("\n{}. {}: {}", option.index, option.name, option.description));
            }
            message.push_str("\nReply with a number or a name.");

            state.selection = Some(SelectionState {
                options: matches.into_iter().map(|m| m.template).collect(),
                parameters: params,
            });
            return ApiResponse::new(ResponseStatus::AwaitingSelection, message).with_options(options);
        }

        let Some(planner) = &self.planner else {
            return ApiResponse::new(ResponseStatus::NoMatch, NO_MATCH_REPLY);
        };
        match planner.plan(text, &params, self.compiler.registry()).await {
            Ok(plan) => {
                info!(%key, plan = %plan.name, steps = plan.steps.len(), "using freeform plan");
                self.compile_and_run(key, state, PendingSource::Plan(plan), params)
                    .await
            }
            Err(e) => {
                warn!(%key, error = %e, "freeform planning failed");
                ApiResponse::new(ResponseStatus::NoMatch, NO_MATCH_REPLY)
            }
        }
    }

    /// Compile, then either hold the workflow for more input, register a
    /// schedule, or run it now.
    async fn compile_and_run(
        &self,
        key: &InstanceKey,
        state: &mut InstanceState,
        source: PendingSource,
        parameters: BTreeMap<String, String>,
    ) -> ApiResponse {
        let workflow = match &source {
            PendingSource::Template(t) => self
                .compiler
                .compile(CompileSource::Template(t.as_ref()), &parameters),
            PendingSource::Plan(p) => self.compiler.compile(CompileSource::Plan(p), &parameters),
        };
        let report = workflow.validation().clone();

        if !report.is_valid {
            let question = clarifying_question(&report).unwrap_or_default();
            if report.errors.is_empty() {
                info!(
                    %key,
                    workflow_id = %workflow.workflow_id(),
                    missing = ?report.missing_params,
                    "workflow needs input"
                );
                state.pending = Some(PendingWorkflow {
                    source,
                    parameters,
                    missing: report.missing_params.clone(),
                });
                return ApiResponse::new(ResponseStatus::NeedsInput, question)
                    .with_workflow(workflow.workflow_id())
                    .with_missing(report.missing_params);
            }
            warn!(%key, workflow_id = %workflow.workflow_id(), report = %report.summary(), "workflow rejected");
            return ApiResponse::error(question)
                .with_workflow(workflow.workflow_id())
                .with_missing(report.missing_params);
        }

        state.reset_flow();
        if let Err(e) = self.workflows.save_workflow(&key.agent_id, &workflow).await {
            warn!(%key, workflow_id = %workflow.workflow_id(), error = %e, "failed to save workflow");
            return ApiResponse::error(format!("I couldn't save the workflow: {e}"))
                .with_workflow(workflow.workflow_id());
        }

        if let Some(config) = schedule_config(&parameters) {
            return self.schedule(key, &workflow, config).await;
        }
        self.run(key, &workflow).await
    }

    async fn schedule(&self, key: &InstanceKey, workflow: &Workflow, config: Value) -> ApiResponse {
        let every = format!("{} {}", config["interval"], config["unit"].as_str().unwrap_or("minutes"));
        match self
            .scheduler
            .create_trigger(&key.agent_id, workflow.workflow_id(), TriggerType::TimeBased, config)
            .await
        {
            Ok(trigger) => {
                info!(%key, workflow_id = %workflow.workflow_id(), trigger_id = %trigger.trigger_id, "workflow scheduled");
                ApiResponse::new(
                    ResponseStatus::Scheduled,
                    format!("Scheduled \"{}\" to run every {every}.", workflow.name()),
                )
                .with_workflow(workflow.workflow_id())
                .with_trigger(trigger.trigger_id)
            }
            Err(e) => ApiResponse::error(format!("I couldn't schedule that: {e}"))
                .with_workflow(workflow.workflow_id()),
        }
    }

    async fn run(&self, key: &InstanceKey, workflow: &Workflow) -> ApiResponse {
        let result = match self.engine.execute(workflow).await {
            Ok(result) => result,
            Err(e) => {
                return ApiResponse::error(format!("I couldn't run that workflow: {e}"))
                    .with_workflow(workflow.workflow_id());
            }
        };

        if let Err(e) = self
            .workflows
            .save_execution_log(result.execution_id, result.workflow_id, result.status, &result)
            .await
        {
            warn!(%key, execution_id = %result.execution_id, error = %e, "failed to save execution log");
        }

        info!(
            %key,
            workflow_id = %result.workflow_id,
            execution_id = %result.execution_id,
            status = %result.status,
            "workflow executed"
        );
        let message = format!("Ran \"{}\": {}.", workflow.name(), result.summary());
        ApiResponse::new(ResponseStatus::Executed, message).with_result(result)
    }
}

impl std::fmt::Debug for MessagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePipeline")
            .field("templates", &self.matcher.catalog().len())
            .field("planner", &self.planner.is_some())
            .field("context_window", &self.context_window)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

fn is_cancel(text: &str) -> bool {
    let lower = text.trim().trim_end_matches(['.', '!']).to_lowercase();
    CANCEL_WORDS.contains(&lower.as_str())
}

/// Index of the option a reply picks: a 1-based number, or a template id or
/// name (case-insensitive).
pub fn pick_option(text: &str, options: &[Arc<Template>]) -> Option<usize> {
    let reply = text.trim().trim_start_matches('#').trim_end_matches('.').trim();
    if let Ok(n) = reply.parse::<usize>() {
        return (1..=options.len()).contains(&n).then(|| n - 1);
    }
    let lower = reply.to_lowercase();
    options
        .iter()
        .position(|t| t.id.to_lowercase() == lower || t.name.to_lowercase() == lower)
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Parameter values from a follow-up reply.
///
/// Accepts `key: value` or `key = value` pairs separated by newlines,
/// semicolons, or commas; only keys in `missing` are taken.  A comma not
/// followed by a known key continues the previous value, so lists survive.
/// When exactly one parameter is missing, a reply with no pairs is taken as
/// its value.
pub fn parse_follow_up(text: &str, missing: &[String]) -> BTreeMap<String, String> {
    let mut filled: BTreeMap<String, String> = BTreeMap::new();

    for line in text.split(['\n', ';']) {
        let mut current: Option<String> = None;
        for part in line.split(',') {
            let pair = part
                .split_once([':', '='])
                .map(|(k, v)| (normalize_key(k), v.trim()))
                .filter(|(k, _)| missing.contains(k));
            match pair {
                Some((k, v)) => {
                    filled.insert(k.clone(), v.trim_matches('"').to_string());
                    current = Some(k);
                }
                None => {
                    if let Some(k) = &current
                        && let Some(value) = filled.get_mut(k)
                    {
                        value.push(',');
                        value.push_str(part);
                    }
                }
            }
        }
    }

    filled.retain(|_, v| {
        *v = v.trim().to_string();
        !v.is_empty()
    });

    if filled.is_empty()
        && let [only] = missing
    {
        let value = text.trim().trim_matches('"').trim();
        if !value.is_empty() && !is_cancel(value) {
            filled.insert(only.clone(), value.to_string());
        }
    }
    filled
}

/// A time-based trigger config when the request carried a cadence.
fn schedule_config(params: &BTreeMap<String, String>) -> Option<Value> {
    let every: u64 = params.get("schedule_interval")?.parse().ok()?;
    let unit = params.get("schedule_unit")?;
    Some(json!({"interval": every, "unit": unit}))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
