//! Provider construction.
//!
//! Turns a resolved [`ModelConfig`] into the adapter for its provider kind,
//! wrapped in the text tool protocol when the config asks for it.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::prompt_tools::PromptToolProvider;
use crate::traits::LlmProvider;
use mcx_domain::config::{ModelConfig, ProviderKind, ToolProtocol};
use mcx_domain::error::Result;
use std::sync::Arc;

/// Instantiate the provider described by `cfg`.
pub fn build_provider(cfg: &ModelConfig) -> Result<Arc<dyn LlmProvider>> {
    let adapter: Arc<dyn LlmProvider> = match cfg.provider {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_config(cfg)?),
        ProviderKind::DashScope | ProviderKind::OpenaiCompat => Arc::new(OpenAiCompatProvider::from_config(cfg)?),
    };

    tracing::info!(
        provider = %cfg.provider,
        model = %cfg.model,
        tool_protocol = ?cfg.tool_protocol,
        "registered LLM provider"
    );

    Ok(match cfg.tool_protocol {
        ToolProtocol::Native => adapter,
        ToolProtocol::Prompt => Arc::new(PromptToolProvider::new(adapter)),
    })
}
