//! Integration tests for the autoflow-agent crate.
//!
//! These tests exercise the completion seam and conversation history
//! without requiring a live LLM connection.

use std::sync::Mutex;

use async_trait::async_trait;
use autoflow_agent::{
    AgentError, CompletionModel, ConversationHistory, LlmClient, LlmClientConfig, Message, Role,
    strip_code_fences,
};

// ═══════════════════════════════════════════════════════════════════════
//  A scripted completion model
// ═══════════════════════════════════════════════════════════════════════

struct Echo {
    seen: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl CompletionModel for Echo {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, system: &str, messages: &[Message]) -> autoflow_agent::Result<String> {
        self.seen
            .lock()
            .unwrap()
            .push((system.to_string(), messages.len()));
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("```json\n{{\"echo\": \"{last}\"}}\n```"))
    }
}

#[tokio::test]
async fn completion_model_receives_recent_history() {
    let mut history = ConversationHistory::new(20);
    history.push_user("hello");
    history.push_assistant("hi, what should I automate?");
    history.push_user("send the report");

    let model = Echo {
        seen: Mutex::new(Vec::new()),
    };
    let answer = model
        .complete("classify", &history.recent(2))
        .await
        .unwrap();

    let value: serde_json::Value = serde_json::from_str(strip_code_fences(&answer)).unwrap();
    assert_eq!(value["echo"], "send the report");
    assert_eq!(model.seen.lock().unwrap()[0], ("classify".to_string(), 2));
}

#[test]
fn histories_are_independent_values() {
    let mut a = ConversationHistory::new(10);
    let mut b = a.clone();
    a.push_user("only in a");
    b.push_assistant("only in b");

    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a.recent(1)[0].role, Role::User);
    assert_eq!(b.recent(1)[0].role, Role::Assistant);
}

#[test]
fn llm_client_requires_key() {
    let err = LlmClient::new(LlmClientConfig::anthropic("", "claude-sonnet-4-20250514"))
        .unwrap_err();
    assert!(matches!(err, AgentError::MissingApiKey { .. }));
    assert!(err.to_string().contains("anthropic"));
}

#[test]
fn llm_client_is_a_completion_model() {
    let client = LlmClient::new(LlmClientConfig::openai("sk-test", "gpt-4o")).unwrap();
    let model: &dyn CompletionModel = &client;
    assert_eq!(model.model_name(), "gpt-4o");
}
