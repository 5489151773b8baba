//! Language-model plumbing for autoflow.
//!
//! ## Modules
//!
//! - [`llm`] -- LLM client for Anthropic and OpenAI-compatible APIs.
//! - [`completion`] -- The [`CompletionModel`] seam the classifier and
//!   planner call through.
//! - [`history`] -- Bounded per-instance conversation memory.
//! - [`error`] -- Agent error types.

pub mod completion;
pub mod error;
pub mod history;
pub mod llm;

pub use completion::{CompletionModel, strip_code_fences};
pub use error::{AgentError, Result};
pub use history::{ConversationHistory, HistoryEntry};
pub use llm::{ChatRequest, LlmClient, LlmClientConfig, LlmProvider, Message, Role};
