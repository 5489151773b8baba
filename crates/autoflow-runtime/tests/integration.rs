//! Integration tests for the autoflow-runtime crate.
//!
//! These drive `AutomationService` the way an entry point would: several
//! instances talking at once, follow-up replies, template selection,
//! scheduling, and SQLite persistence.

use std::sync::Arc;
use std::time::Duration;

use autoflow_drivers::{DryRunDriver, standard_drivers};
use autoflow_intent::{ExecutionStatus, InMemoryTriggerRepository, InMemoryWorkflowRepository, TemplateCatalog};
use autoflow_kernel::{Driver, DriverRegistry, OperationSpec};
use autoflow_runtime::{AppConfig, AutomationService, ResponseStatus};
use autoflow_store::{ConversationStore, Database, ExecutionLogStore};
use chrono::Utc;
use serde_json::{Value, json};

// ═══════════════════════════════════════════════════════════════════════
//  Fixtures
// ═══════════════════════════════════════════════════════════════════════

fn service() -> AutomationService {
    AutomationService::in_memory(AppConfig::default()).unwrap()
}

/// Standard drivers, except that sending email takes `delay`.
fn slow_email_registry(delay: Duration) -> DriverRegistry {
    let email = DryRunDriver::new(
        "email",
        "Outbound email",
        vec![
            OperationSpec::new("send", "Send an email")
                .require(["to", "subject", "body"])
                .optional(["cc", "bcc"]),
        ],
    )
    .with_delay("send", delay);

    standard_drivers()
        .into_iter()
        .filter(|d| d.name() != "email")
        .chain(std::iter::once(Arc::new(email) as Arc<dyn Driver>))
        .try_fold(DriverRegistry::builder(), |b, d| b.register(d))
        .unwrap()
        .build()
}

const TWO_TASK_TEMPLATES: &str = r#"
[[templates]]
id = "bug-ticket"
name = "Bug ticket"
description = "File a bug on the board"
category = "tasks"
keywords = ["task", "create", "bug"]
complexity = "simple"

[[templates.steps]]
step_id = "file"
driver = "tasks"
operation = "create_task"

[templates.steps.parameters]
name = "{{name|Bug report}}"
project = "{{project|Triage}}"

[[templates]]
id = "chore"
name = "Chore"
description = "Add a chore to the board"
category = "tasks"
keywords = ["task", "create", "chore"]
complexity = "simple"

[[templates.steps]]
step_id = "add"
driver = "tasks"
operation = "create_task"

[templates.steps.parameters]
name = "{{name|Chore}}"
project = "{{project|Housekeeping}}"
"#;

// ═══════════════════════════════════════════════════════════════════════
//  Conversations
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn welcome_email_runs_through_the_service() {
    let workflows = Arc::new(InMemoryWorkflowRepository::new());
    let service = AutomationService::builder(AppConfig::default())
        .repositories(workflows.clone(), Arc::new(InMemoryTriggerRepository::new()))
        .build()
        .unwrap();

    let r = service
        .send_message("agent1", "s1", "Send a welcome email to ops@example.com")
        .await;
    assert_eq!(r.status, ResponseStatus::Executed, "{}", r.message);
    let result = r.execution_result.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.succeeded, 1);
    assert_eq!(r.workflow_id, Some(result.workflow_id));

    assert_eq!(workflows.workflows_for("agent1").await, vec![result.workflow_id]);
    assert_eq!(workflows.execution_logs().await.len(), 1);
}

#[tokio::test]
async fn follow_up_reply_completes_pending_task() {
    let service = service();

    let first = service.send_message("agent1", "s1", "Create a task").await;
    assert_eq!(first.status, ResponseStatus::NeedsInput);
    assert_eq!(first.missing_params, vec!["name", "project"]);

    let second = service
        .send_message("agent1", "s1", "call it \"Quarterly review\" in the Apollo project")
        .await;
    assert_eq!(second.status, ResponseStatus::Executed, "{}", second.message);
    assert_eq!(
        second.execution_result.unwrap().status,
        ExecutionStatus::Completed
    );
}

#[tokio::test]
async fn partial_follow_up_keeps_asking() {
    let service = service();
    service.send_message("agent1", "s1", "Create a task").await;

    let r = service.send_message("agent1", "s1", "name: Quarterly review").await;
    assert_eq!(r.status, ResponseStatus::NeedsInput);
    assert_eq!(r.missing_params, vec!["project"]);

    // With one parameter left, a bare reply fills it.
    let r = service.send_message("agent1", "s1", "Apollo").await;
    assert_eq!(r.status, ResponseStatus::Executed, "{}", r.message);
}

#[tokio::test]
async fn instances_keep_separate_state() {
    let service = service();

    for session in ["s1", "s2"] {
        let r = service.send_message("agent1", session, "Create a task").await;
        assert_eq!(r.status, ResponseStatus::NeedsInput);
    }

    let done = service
        .send_message("agent1", "s1", "name: Alpha; project: Apollo")
        .await;
    assert_eq!(done.status, ResponseStatus::Executed, "{}", done.message);

    let statuses = service.list_instances_status().data.unwrap();
    let statuses = statuses.as_array().unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0]["session_id"], "s1");
    assert_eq!(statuses[0]["has_pending_workflow"], false);
    assert_eq!(statuses[1]["session_id"], "s2");
    assert_eq!(statuses[1]["has_pending_workflow"], true);
    assert_eq!(statuses[1]["history_len"], 2);

    let cancelled = service.send_message("agent1", "s2", "cancel").await;
    assert_eq!(cancelled.status, ResponseStatus::Cancelled);
}

#[tokio::test]
async fn concurrent_sessions_do_not_share_history() {
    let service = Arc::new(service());

    let talk = |session: &'static str, messages: [&'static str; 2]| {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let mut statuses = Vec::new();
            for text in messages {
                statuses.push(service.send_message("agent1", session, text).await.status);
            }
            statuses
        })
    };
    let tasks = talk("s1", ["Create a task", "name: Alpha; project: Apollo"]);
    let email = talk(
        "s2",
        ["Send a welcome email to ops@example.com", "Create a task"],
    );
    let (tasks, email) = (tasks.await.unwrap(), email.await.unwrap());
    assert_eq!(tasks, vec![ResponseStatus::NeedsInput, ResponseStatus::Executed]);
    assert_eq!(email[0], ResponseStatus::Executed);
    assert_eq!(email[1], ResponseStatus::NeedsInput);

    let contents = |session: &str| -> Vec<String> {
        let instance = service.instances().get("agent1", session).unwrap();
        let state = instance.try_begin().unwrap();
        state.history.entries().map(|e| e.content.clone()).collect()
    };
    let s1 = contents("s1");
    let s2 = contents("s2");
    assert_eq!(s1.len(), 4);
    assert_eq!(s2.len(), 4);
    assert!(s1.iter().all(|c| !c.contains("ops@example.com")));
    assert!(s2.iter().all(|c| !c.contains("Alpha")));

    let statuses = service.list_instances_status().data.unwrap();
    let statuses = statuses.as_array().unwrap();
    assert_eq!(statuses[0]["has_pending_workflow"], false);
    assert_eq!(statuses[1]["has_pending_workflow"], true);
}

#[tokio::test]
async fn several_candidates_wait_for_a_pick() {
    let service = AutomationService::builder(AppConfig::default())
        .catalog(TemplateCatalog::from_toml_str(TWO_TASK_TEMPLATES).unwrap())
        .build()
        .unwrap();

    let offer = service.send_message("agent1", "s1", "Create a task").await;
    assert_eq!(offer.status, ResponseStatus::AwaitingSelection);
    let ids: Vec<&str> = offer.options.iter().map(|o| o.template_id.as_str()).collect();
    assert_eq!(ids, vec!["bug-ticket", "chore"]);
    assert_eq!(offer.options[1].index, 2);

    let picked = service.send_message("agent1", "s1", "2").await;
    assert_eq!(picked.status, ResponseStatus::Executed, "{}", picked.message);
    assert!(picked.message.contains("Chore"));

    // Selection state is gone; a name works on a fresh offer.
    service.send_message("agent1", "s1", "Create a task").await;
    let by_name = service.send_message("agent1", "s1", "bug ticket").await;
    assert_eq!(by_name.status, ResponseStatus::Executed);
    assert!(by_name.message.contains("Bug ticket"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Concurrency
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn second_message_to_a_busy_instance_is_rejected() {
    let service = Arc::new(
        AutomationService::builder(AppConfig::default())
            .registry(slow_email_registry(Duration::from_millis(300)))
            .build()
            .unwrap(),
    );

    let first = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .send_message("agent1", "s1", "Send a welcome email to ops@example.com")
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let busy = service.send_message("agent1", "s1", "hi").await;
    assert_eq!(busy.status, ResponseStatus::Busy);

    // A different session is unaffected.
    let other = service.send_message("agent1", "s2", "hi").await;
    assert_eq!(other.status, ResponseStatus::Conversation);

    let first = first.await.unwrap();
    assert_eq!(first.status, ResponseStatus::Executed);

    let after = service.send_message("agent1", "s1", "hi").await;
    assert_eq!(after.status, ResponseStatus::Conversation);
}

// ═══════════════════════════════════════════════════════════════════════
//  Triggers
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn scheduled_request_registers_a_trigger() {
    let service = service();

    let r = service.send_message("agent1", "s1", "Remind me every day").await;
    assert_eq!(r.status, ResponseStatus::Scheduled, "{}", r.message);
    let trigger_id = r.trigger_id.unwrap();
    assert!(r.execution_result.is_none());

    let listed = service.list_triggers("agent1").await.data.unwrap();
    assert_eq!(listed[0]["trigger_id"], trigger_id.to_string());
    assert_eq!(listed[0]["config"], json!({"interval": 1, "unit": "days"}));

    let report = service.scheduler().run_once(Utc::now()).await.unwrap();
    assert_eq!(report.fired.len(), 1);
    for fired in report.fired {
        let result = fired.handle.await.unwrap().unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
    }
}

#[tokio::test]
async fn manual_trigger_fires_on_request() {
    let service = service();
    let run = service
        .send_message("agent1", "s1", "Send a welcome email to ops@example.com")
        .await;
    let workflow_id = run.workflow_id.unwrap();

    let created = service
        .create_trigger("agent1", workflow_id, "manual", Value::Null)
        .await;
    assert_eq!(created.status, ResponseStatus::Ok, "{}", created.message);
    let trigger_id = created.trigger_id.unwrap();

    let fired = service.fire_trigger(trigger_id).await;
    assert_eq!(fired.status, ResponseStatus::Executed, "{}", fired.message);
    let result = fired.execution_result.unwrap();
    assert_eq!(result.workflow_id, workflow_id);
    assert_ne!(Some(result.execution_id), run.execution_result.map(|r| r.execution_id));

    assert_eq!(service.pause_trigger(trigger_id).await.status, ResponseStatus::Ok);
    assert_eq!(service.resume_trigger(trigger_id).await.status, ResponseStatus::Ok);
}

// ═══════════════════════════════════════════════════════════════════════
//  Persistence
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn from_config_persists_runs_and_turns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autoflow.db");
    let mut config = AppConfig::default();
    config.storage.database_path = path.clone();

    let service = AutomationService::from_config(config).await.unwrap();
    let r = service
        .send_message("agent1", "s1", "Send a welcome email to ops@example.com")
        .await;
    assert_eq!(r.status, ResponseStatus::Executed, "{}", r.message);
    service.shutdown().await;

    let db = Database::open(&path).unwrap();
    assert_eq!(ExecutionLogStore::new(db.clone()).count().await.unwrap(), 1);
    let turns = ConversationStore::new(db)
        .recent("agent1", "s1", 10)
        .await
        .unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, "user");
    assert_eq!(turns[1].role, "assistant");
}
