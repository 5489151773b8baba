//! Builds the optional language model from settings.

use std::sync::Arc;

use tracing::info;

use autoflow_agent::{AgentError, CompletionModel, LlmClient, LlmClientConfig};

use crate::config::{LlmProviderKind, LlmSettings};
use crate::error::Result;

/// The configured model, or `None` when the provider is `none`.
///
/// The key is read through `lookup` from the variable named by
/// `api_key_env`; a configured provider without a key is an error rather
/// than a silent fallback.
pub fn build_model(
    settings: &LlmSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<Arc<dyn CompletionModel>>> {
    let provider = match settings.provider {
        LlmProviderKind::None => return Ok(None),
        LlmProviderKind::Anthropic => "anthropic",
        LlmProviderKind::Openai => "openai",
    };

    let api_key = lookup(&settings.api_key_env)
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| AgentError::MissingApiKey {
            provider: provider.to_string(),
        })?;

    let config = match (settings.provider, &settings.base_url) {
        (LlmProviderKind::Openai, Some(base_url)) => {
            LlmClientConfig::openai_compatible(api_key, &settings.model, base_url)
        }
        (LlmProviderKind::Openai, None) => LlmClientConfig::openai(api_key, &settings.model),
        _ => LlmClientConfig::anthropic(api_key, &settings.model),
    };

    let client = LlmClient::new(config)?;
    info!(provider, model = %settings.model, "language model configured");
    Ok(Some(Arc::new(client)))
}
