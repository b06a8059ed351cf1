use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    /// Alibaba DashScope (Qwen models), spoken to through its
    /// OpenAI-compatible endpoint.
    DashScope,
    OpenaiCompat,
}

impl ProviderKind {
    /// Parse a provider identifier as written in config files or on the
    /// command line. `qwen` and `dashscope` are aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Some(Self::Anthropic),
            "qwen" | "dashscope" => Some(Self::DashScope),
            "openai" | "openai_compat" => Some(Self::OpenaiCompat),
            _ => None,
        }
    }

    /// Environment variable consulted when no credential is configured.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::DashScope => "DASHSCOPE_API_KEY",
            Self::OpenaiCompat => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::DashScope => "qwen-turbo",
            Self::OpenaiCompat => "gpt-4o-mini",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::DashScope => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            Self::OpenaiCompat => "https://api.openai.com/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Anthropic => "anthropic",
            Self::DashScope => "dashscope",
            Self::OpenaiCompat => "openai",
        })
    }
}

/// How the tool catalog is presented to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolProtocol {
    /// The provider's native function/tool calling.
    #[default]
    Native,
    /// Tools are described in a system prompt and the model answers with
    /// `TOOL_CALL: name {json}` lines.
    Prompt,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model section (as written) and resolved model config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The `model` block exactly as it appears in a config file. Every field
/// is optional so that command-line values can be layered on top with
/// [`ModelSection::overlay`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Endpoint override (e.g. a proxy or a self-hosted compatible server).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub tool_protocol: Option<ToolProtocol>,
}

impl ModelSection {
    /// Field-by-field merge: every value set in `overrides` replaces the
    /// corresponding value in `self`.
    pub fn overlay(self, overrides: ModelSection) -> ModelSection {
        ModelSection {
            provider: overrides.provider.or(self.provider),
            model: overrides.model.or(self.model),
            api_key: overrides.api_key.or(self.api_key),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            base_url: overrides.base_url.or(self.base_url),
            tool_protocol: overrides.tool_protocol.or(self.tool_protocol),
        }
    }
}

/// Fully resolved model configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: String,
    pub max_tokens: u32,
    pub base_url: String,
    pub tool_protocol: ToolProtocol,
}

pub const DEFAULT_MAX_TOKENS: u32 = 1000;

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("max_tokens", &self.max_tokens)
            .field("base_url", &self.base_url)
            .field("tool_protocol", &self.tool_protocol)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_aliases() {
        assert_eq!(ProviderKind::parse("Anthropic"), Some(ProviderKind::Anthropic));
        assert_eq!(ProviderKind::parse("qwen"), Some(ProviderKind::DashScope));
        assert_eq!(ProviderKind::parse("dashscope"), Some(ProviderKind::DashScope));
        assert_eq!(ProviderKind::parse("openai"), Some(ProviderKind::OpenaiCompat));
        assert_eq!(ProviderKind::parse("gemini"), None);
    }

    #[test]
    fn provider_env_vars() {
        assert_eq!(ProviderKind::Anthropic.api_key_env(), "ANTHROPIC_API_KEY");
        assert_eq!(ProviderKind::DashScope.api_key_env(), "DASHSCOPE_API_KEY");
    }

    #[test]
    fn overlay_prefers_override_values() {
        let file = ModelSection {
            provider: Some("qwen".into()),
            model: Some("qwen-turbo".into()),
            api_key: Some("file-key".into()),
            max_tokens: Some(1000),
            ..Default::default()
        };
        let cli = ModelSection {
            model: Some("qwen-max".into()),
            max_tokens: Some(2048),
            ..Default::default()
        };
        let merged = file.overlay(cli);
        assert_eq!(merged.provider.as_deref(), Some("qwen"));
        assert_eq!(merged.model.as_deref(), Some("qwen-max"));
        assert_eq!(merged.api_key.as_deref(), Some("file-key"));
        assert_eq!(merged.max_tokens, Some(2048));
    }

    #[test]
    fn debug_redacts_api_key() {
        let cfg = ModelConfig {
            provider: ProviderKind::Anthropic,
            model: "m".into(),
            api_key: "sk-secret".into(),
            max_tokens: 10,
            base_url: "https://api.anthropic.com".into(),
            tool_protocol: ToolProtocol::Native,
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
