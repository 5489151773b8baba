//! Integration tests for the autoflow-intent crate.
//!
//! These run the classifier, matcher, compiler, engine, and scheduler
//! together against the standard dry-run drivers, with no model attached.

use std::collections::BTreeMap;
use std::sync::Arc;

use autoflow_drivers::{DryRunDriver, standard_registry};
use autoflow_intent::{
    Category, CompileSource, ExecutionConfig, ExecutionEngine, ExecutionStatus, FreeformPlan,
    InMemoryTriggerRepository, InMemoryWorkflowRepository, IntentClassifier, MatchingConfig,
    SchedulerConfig, StepStatus, TemplateCatalog, TemplateMatcher, TriggerScheduler, TriggerType,
    WorkflowCompiler, WorkflowRepository, clarifying_question,
};
use autoflow_kernel::{DriverRegistry, OperationSpec};
use chrono::{TimeDelta, Utc};
use serde_json::json;

// ═══════════════════════════════════════════════════════════════════════
//  Fixtures
// ═══════════════════════════════════════════════════════════════════════

struct Pipeline {
    classifier: IntentClassifier,
    matcher: TemplateMatcher,
    compiler: WorkflowCompiler,
    engine: ExecutionEngine,
}

fn pipeline() -> Pipeline {
    let registry = standard_registry().unwrap();
    Pipeline {
        classifier: IntentClassifier::new().unwrap(),
        matcher: TemplateMatcher::new(
            Arc::new(TemplateCatalog::builtin().unwrap()),
            MatchingConfig::default(),
        ),
        compiler: WorkflowCompiler::new(registry.clone()),
        engine: ExecutionEngine::new(registry, ExecutionConfig::default()),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  End-to-end scenarios
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn welcome_email_end_to_end() {
    let p = pipeline();

    let intent = p
        .classifier
        .classify("Send a welcome email to ops@example.com", &[])
        .await;
    assert!(intent.is_automation);
    assert_eq!(intent.category, Category::Email);
    assert!(intent.confidence >= 0.7);
    assert_eq!(intent.extracted_parameters["recipient"], "ops@example.com");

    let matches = p.matcher.candidates(&intent);
    assert!(p.matcher.should_auto_select(&intent, &matches));
    let template = &matches[0].template;
    assert_eq!(template.category, Category::Email);

    let workflow = p
        .compiler
        .compile(CompileSource::Template(template), &intent.extracted_parameters);
    assert!(workflow.is_valid(), "{}", workflow.validation().summary());
    assert_eq!(workflow.steps().len(), 1);
    let step = &workflow.steps()[0];
    assert_eq!(step.driver, "email");
    assert_eq!(step.operation, "send");
    assert_eq!(step.parameters["to"], "ops@example.com");

    let result = p.engine.execute(&workflow).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.total, 1);
}

#[tokio::test]
async fn create_task_asks_for_name_and_project() {
    let p = pipeline();

    let intent = p.classifier.classify("Create a task", &[]).await;
    assert_eq!(intent.category, Category::Tasks);

    let matches = p.matcher.candidates(&intent);
    assert!(!p.matcher.should_auto_select(&intent, &matches));
    assert_eq!(matches.len(), 1);

    let workflow = p.compiler.compile(
        CompileSource::Template(&matches[0].template),
        &intent.extracted_parameters,
    );
    assert!(!workflow.is_valid());
    assert_eq!(workflow.validation().missing_params, vec!["name", "project"]);

    let question = clarifying_question(workflow.validation()).unwrap();
    assert!(question.contains("name and project"));

    // An invalid workflow is refused outright.
    assert!(p.engine.execute(&workflow).await.is_err());
}

#[tokio::test]
async fn small_talk_never_reaches_the_matcher() {
    let p = pipeline();
    for text in ["hi!", "thanks, that's all", "what can you do?"] {
        let intent = p.classifier.classify(text, &[]).await;
        assert!(!intent.is_automation, "{text}");
        assert!(p.matcher.candidates(&intent).is_empty());
    }
}

#[tokio::test]
async fn follow_up_parameters_complete_the_task() {
    let p = pipeline();
    let catalog = TemplateCatalog::builtin().unwrap();
    let template = catalog.get("create-task").unwrap();

    let mut params = BTreeMap::new();
    let first = p.compiler.compile(CompileSource::Template(&template), &params);
    assert!(!first.is_valid());

    params.extend(p.classifier.extract("call it \"Quarterly review\" in the Apollo project"));
    let second = p.compiler.compile(CompileSource::Template(&template), &params);
    assert!(second.is_valid(), "{}", second.validation().summary());
    assert_ne!(first.workflow_id(), second.workflow_id());

    let result = p.engine.execute(&second).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
}

// ═══════════════════════════════════════════════════════════════════════
//  Compiler and engine properties
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn zero_steps_and_unknown_drivers_fail_validation() {
    let compiler = WorkflowCompiler::new(standard_registry().unwrap());
    for steps in [
        json!([]),
        json!([{"step_id": "x", "driver": "carrier_pigeon", "operation": "send"}]),
    ] {
        let plan: FreeformPlan = serde_json::from_value(json!({"name": "p", "steps": steps})).unwrap();
        let wf = compiler.compile(CompileSource::Plan(&plan), &BTreeMap::new());
        let report = wf.validation();
        assert!(!report.is_valid);
        assert!(!report.errors.is_empty() || !report.missing_params.is_empty());
    }
}

#[test]
fn two_step_cycle_is_circular() {
    let compiler = WorkflowCompiler::new(standard_registry().unwrap());
    let plan: FreeformPlan = serde_json::from_value(json!({
        "name": "loop",
        "steps": [
            {"step_id": "A", "driver": "notify", "operation": "send",
             "parameters": {"message": "a"}, "depends_on": ["B"]},
            {"step_id": "B", "driver": "notify", "operation": "send",
             "parameters": {"message": "b"}, "depends_on": ["A"]}
        ]
    }))
    .unwrap();
    let wf = compiler.compile(CompileSource::Plan(&plan), &BTreeMap::new());
    assert!(!wf.is_valid());
    assert!(
        wf.validation()
            .errors
            .iter()
            .any(|e| e.contains("circular dependency"))
    );
}

#[tokio::test]
async fn step_reference_resolves_before_dispatch() {
    let driver = Arc::new(
        DryRunDriver::new(
            "svc",
            "",
            vec![
                OperationSpec::new("produce", ""),
                OperationSpec::new("consume", "").require(["value"]),
            ],
        )
        .with_response("produce", json!("X")),
    );
    let registry = DriverRegistry::builder()
        .register(driver.clone())
        .unwrap()
        .build();
    let plan: FreeformPlan = serde_json::from_value(json!({
        "name": "refs",
        "steps": [
            {"step_id": "A", "driver": "svc", "operation": "produce"},
            {"step_id": "B", "driver": "svc", "operation": "consume",
             "parameters": {"value": "step:A.output"}}
        ]
    }))
    .unwrap();
    let wf = WorkflowCompiler::new(registry.clone()).compile(CompileSource::Plan(&plan), &BTreeMap::new());
    let result = ExecutionEngine::new(registry, ExecutionConfig::default())
        .execute(&wf)
        .await
        .unwrap();

    assert_eq!(result.step("B").unwrap().status, StepStatus::Completed);
    let consume = driver
        .calls()
        .into_iter()
        .find(|c| c.operation == "consume")
        .unwrap();
    assert_eq!(consume.parameters["value"], "X");
}

// ═══════════════════════════════════════════════════════════════════════
//  Scheduling
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn scheduled_workflow_fires_with_fresh_context() {
    let registry = standard_registry().unwrap();
    let compiler = WorkflowCompiler::new(registry.clone());
    let catalog = TemplateCatalog::builtin().unwrap();
    let template = catalog.get("scheduled-reminder").unwrap();
    let workflow = compiler.compile(CompileSource::Template(&template), &BTreeMap::new());
    assert!(workflow.is_valid());

    let workflows = Arc::new(InMemoryWorkflowRepository::new());
    workflows.save_workflow("agent1", &workflow).await.unwrap();
    let scheduler = TriggerScheduler::new(
        Arc::new(InMemoryTriggerRepository::new()),
        workflows.clone(),
        ExecutionEngine::new(registry, ExecutionConfig::default()),
        compiler,
        SchedulerConfig::default(),
    );
    scheduler
        .create_trigger(
            "agent1",
            workflow.workflow_id(),
            TriggerType::TimeBased,
            json!({"interval": 60, "unit": "minutes"}),
        )
        .await
        .unwrap();

    let t0 = Utc::now();
    let first = scheduler.run_once(t0).await.unwrap();
    assert_eq!(first.fired.len(), 1);
    let mut execution_ids = Vec::new();
    for fired in first.fired {
        execution_ids.push(fired.handle.await.unwrap().unwrap().execution_id);
    }

    assert!(scheduler.run_once(t0 + TimeDelta::minutes(30)).await.unwrap().fired.is_empty());

    let second = scheduler.run_once(t0 + TimeDelta::minutes(61)).await.unwrap();
    assert_eq!(second.fired.len(), 1);
    for fired in second.fired {
        let result = fired.handle.await.unwrap().unwrap();
        assert_eq!(result.context.len(), 1);
        execution_ids.push(result.execution_id);
    }

    assert_ne!(execution_ids[0], execution_ids[1]);
    assert_eq!(workflows.execution_logs().await.len(), 2);
}
