//! The text-completion seam.
//!
//! The classifier and planner treat the language model as a black box that
//! turns a system prompt plus a short conversation into text.  Anything that
//! implements [`CompletionModel`] can stand in for a real provider, which is
//! how tests script model output.

use async_trait::async_trait;

use crate::error::Result;
use crate::llm::{ChatRequest, LlmClient, Message};

/// A black-box text completion call.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Identifier used in logs.
    fn model_name(&self) -> &str;

    /// Complete `messages` under `system` instructions.
    async fn complete(&self, system: &str, messages: &[Message]) -> Result<String>;
}

#[async_trait]
impl CompletionModel for LlmClient {
    fn model_name(&self) -> &str {
        self.default_model()
    }

    async fn complete(&self, system: &str, messages: &[Message]) -> Result<String> {
        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(Message::system(system));
        all.extend_from_slice(messages);

        let request = ChatRequest {
            model: String::new(),
            messages: all,
            temperature: Some(0.0),
            max_tokens: None,
        };
        self.chat(&request).await
    }
}

/// Strip optional markdown code fences around a JSON answer.
///
/// Models frequently wrap JSON in ```` ```json ... ``` ```` even when told
/// not to; the payload inside is returned trimmed.
pub fn strip_code_fences(text: &str) -> &str {
    let cleaned = text.trim();
    let cleaned = cleaned.strip_prefix("```json").unwrap_or(cleaned);
    let cleaned = cleaned.strip_prefix("```").unwrap_or(cleaned);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
    cleaned.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }
}
