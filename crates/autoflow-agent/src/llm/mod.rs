//! LLM integration layer.
//!
//! - [`types`] -- Provider-agnostic messages and requests.
//! - [`client`] -- HTTP client for Anthropic and OpenAI APIs.

pub mod client;
pub mod types;

pub use client::{LlmClient, LlmClientConfig, LlmProvider};
pub use types::{ChatRequest, Message, Role};
