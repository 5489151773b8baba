//! Natural-language workflow compiler and execution engine for autoflow.
//!
//! This crate provides:
//!
//! - **Intent classification**: model-backed with a deterministic keyword
//!   fallback, via [`classifier::IntentClassifier`].
//! - **Template matching**: a TOML template catalog ranked against intents
//!   by [`template::TemplateMatcher`].
//! - **Compilation**: parameter binding and structural validation into a
//!   versioned [`workflow::Workflow`] by [`compiler::WorkflowCompiler`].
//! - **Execution**: dependency-ordered dispatch with context propagation,
//!   retries, and timeouts via [`engine::ExecutionEngine`].
//! - **Triggers**: time-based, webhook, manual, and db-change rules polled
//!   and fired by [`scheduler::TriggerScheduler`].

pub mod classifier;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod planner;
pub mod repository;
pub mod scheduler;
pub mod template;
pub mod trigger;
pub mod workflow;

pub use classifier::{Category, Complexity, Intent, IntentClassifier, IntentSource};
pub use compiler::{
    CompileSource, FreeformPlan, WorkflowCompiler, clarifying_question, ensure_valid,
};
pub use config::{ExecutionConfig, MatchingConfig, SchedulerConfig};
pub use engine::{
    ExecutionContext, ExecutionEngine, ExecutionResult, ExecutionStatus, StepRecord, StepStatus,
};
pub use error::{IntentError, Result};
pub use planner::PlanGenerator;
pub use repository::{
    ExecutionLog, InMemoryTriggerRepository, InMemoryWorkflowRepository, TriggerRepository,
    WorkflowRepository,
};
pub use scheduler::{DueTrigger, FiredTrigger, TickReport, TriggerScheduler};
pub use template::{StepSpec, Template, TemplateCatalog, TemplateMatch, TemplateMatcher};
pub use trigger::{IntervalUnit, TimeSchedule, Trigger, TriggerStatus, TriggerType};
pub use workflow::{ErrorPolicy, SCHEMA_VERSION, Step, StepRef, ValidationReport, Workflow};
