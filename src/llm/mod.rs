//! LLM provider implementations

use crate::config::LlmConfig;

mod claude;
mod error;
mod openai;
mod types;

pub use claude::{ClaudeProvider, DEFAULT_CLAUDE_MODEL};
pub use error::LlmError;
pub use openai::{OpenAiProvider, DEFAULT_OPENAI_MODEL};
pub use types::*;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for LLM providers
///
/// One call is one completion: the whole window goes up, one assistant
/// response comes back. The tool loop lives in the agent, not here.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Model identifier sent with each request
    fn model(&self) -> &str;

    /// Send a chat completion request
    ///
    /// `system` carries the instructions for this call; `messages` may begin
    /// with a system-role summary turn produced by pruning.
    async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;
}

/// Pick a backend name from the requested one and the keys that are present.
///
/// `auto` prefers Claude when both keys exist.
fn resolve_provider_name(
    requested: &str,
    has_anthropic_key: bool,
    has_openai_key: bool,
) -> Result<&'static str> {
    match requested.to_lowercase().as_str() {
        "claude" | "anthropic" => Ok("claude"),
        "openai" | "gpt" => Ok("openai"),
        "auto" | "" => {
            if has_anthropic_key {
                Ok("claude")
            } else if has_openai_key {
                Ok("openai")
            } else {
                anyhow::bail!(
                    "No LLM API key found. Set ANTHROPIC_API_KEY or OPENAI_API_KEY \
                     (run `moreright setup` to create a .env file)"
                )
            }
        }
        other => anyhow::bail!("Unknown LLM provider: {}. Supported: claude, openai", other),
    }
}

fn env_key_present(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| !v.trim().is_empty())
}

/// Create an LLM provider from configuration
///
/// `provider_override` and `model_override` come from CLI flags and win over
/// the configured values.
pub fn create_provider(
    config: &LlmConfig,
    provider_override: Option<&str>,
    model_override: Option<&str>,
) -> Result<Arc<dyn LlmProvider>> {
    let requested = provider_override.unwrap_or(&config.default_provider);
    let name = resolve_provider_name(
        requested,
        env_key_present("ANTHROPIC_API_KEY"),
        env_key_present("OPENAI_API_KEY"),
    )?;

    let provider: Arc<dyn LlmProvider> = match name {
        "claude" => {
            let model = model_override.unwrap_or(&config.claude.model);
            Arc::new(
                ClaudeProvider::from_env()?
                    .with_model(model)
                    .with_max_tokens(config.claude.max_tokens),
            )
        }
        _ => {
            let model = model_override.unwrap_or(&config.openai.model);
            Arc::new(
                OpenAiProvider::from_env()?
                    .with_model(model)
                    .with_max_tokens(config.openai.max_tokens),
            )
        }
    };

    tracing::info!(provider = provider.name(), model = provider.model(), "LLM provider ready");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_explicit_provider_names() {
        assert_eq!(resolve_provider_name("Anthropic", false, false).unwrap(), "claude");
        assert_eq!(resolve_provider_name("gpt", false, false).unwrap(), "openai");
    }

    #[test]
    fn test_resolve_auto_prefers_available_key() {
        assert_eq!(resolve_provider_name("auto", true, true).unwrap(), "claude");
        assert_eq!(resolve_provider_name("auto", false, true).unwrap(), "openai");

        let err = resolve_provider_name("auto", false, false).unwrap_err();
        assert!(err.to_string().contains("moreright setup"));
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let err = resolve_provider_name("ollama", true, true).unwrap_err();
        assert!(err.to_string().contains("Unknown LLM provider"));
    }
}
