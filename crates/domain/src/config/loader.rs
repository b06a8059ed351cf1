//! Configuration loading: file parsing, command-line overlay, credential
//! lookup and validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    Config, ConfigIssue, GlobalSettings, ModelConfig, ModelSection, ProviderKind,
    ServerDescriptor, DEFAULT_MAX_TOKENS,
};
use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The raw contents of a config file, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub model: Option<ModelSection>,
    #[serde(default)]
    pub servers: Option<Vec<ServerDescriptor>>,
    #[serde(default)]
    pub global_settings: GlobalSettings,
}

impl ConfigFile {
    /// Parse a config document.
    ///
    /// Accepts the full layout (`model` object, `servers`, `global_settings`)
    /// and the flat model-only layout (`provider`, `model`, `api_key`,
    /// `max_tokens` at the top level) used by single-server setups.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(map) = &value else {
            return Err(Error::Config("configuration must be a JSON object".into()));
        };

        let full_layout = map.get("model").is_some_and(Value::is_object)
            || map.contains_key("servers")
            || map.contains_key("global_settings");

        if full_layout {
            Ok(serde_json::from_value(value)?)
        } else {
            let model: ModelSection = serde_json::from_value(value)?;
            Ok(Self {
                model: Some(model),
                ..Default::default()
            })
        }
    }

    /// Read and parse a config file from disk.
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&raw).map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Load request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything needed to produce a [`Config`].
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    /// Config file (multi-server config, or model settings in
    /// single-server mode).
    pub config_path: Option<PathBuf>,
    /// Server script for single-server mode.
    pub script: Option<PathBuf>,
    /// Command-line model settings; set fields win over the file.
    pub overrides: ModelSection,
}

/// A successfully loaded config together with the warnings found while
/// validating it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub warnings: Vec<ConfigIssue>,
}

/// Load and validate, reading credentials from the process environment.
pub fn load(req: &LoadRequest) -> Result<LoadedConfig> {
    load_with_env(req, &|name| std::env::var(name).ok())
}

/// Load and validate. Fails with [`Error::Config`] listing every
/// error-severity issue; warnings are logged and returned.
pub fn load_with_env(req: &LoadRequest, env: &dyn Fn(&str) -> Option<String>) -> Result<LoadedConfig> {
    let (config, issues) = check_with_env(req, env)?;

    let errors: Vec<String> = issues
        .iter()
        .filter(|i| i.is_error())
        .map(ToString::to_string)
        .collect();
    if !errors.is_empty() {
        return Err(Error::Config(errors.join("; ")));
    }

    let warnings: Vec<ConfigIssue> = issues.into_iter().filter(|i| !i.is_error()).collect();
    for w in &warnings {
        tracing::warn!(field = %w.field, "{}", w.message);
    }

    let config = config.ok_or_else(|| Error::Config("configuration is incomplete".into()))?;
    Ok(LoadedConfig { config, warnings })
}

/// Validate without failing on issues: returns the config (when no
/// error-severity issue was found) and every issue. Only unreadable or
/// malformed files are returned as `Err`.
pub fn check_with_env(
    req: &LoadRequest,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<(Option<Config>, Vec<ConfigIssue>)> {
    let mut issues = Vec::new();

    if req.config_path.is_none() && req.script.is_none() {
        issues.push(ConfigIssue::error(
            "config",
            "no configuration file or server script given",
        ));
        return Ok((None, issues));
    }

    let file = match &req.config_path {
        Some(path) => ConfigFile::read(path)?,
        None => ConfigFile::default(),
    };
    let base_dir = req
        .config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let single_server = req.script.is_some();
    let section = file
        .model
        .clone()
        .unwrap_or_default()
        .overlay(req.overrides.clone());
    let model = resolve_model(section, single_server, env, &mut issues);

    let servers = match &req.script {
        Some(script) => {
            if file.servers.as_ref().is_some_and(|s| !s.is_empty()) {
                issues.push(ConfigIssue::warning(
                    "servers",
                    "ignored in single-server mode (a server script was given)",
                ));
            }
            vec![ServerDescriptor::from_script(script)]
        }
        None => match file.servers {
            Some(mut list) => {
                for server in &mut list {
                    server.resolve_relative_to(&base_dir);
                }
                list
            }
            None => {
                issues.push(ConfigIssue::error("servers", "a servers list is required"));
                Vec::new()
            }
        },
    };

    validate_servers(&servers, &mut issues);
    validate_settings(&file.global_settings, &mut issues);

    let has_errors = issues.iter().any(ConfigIssue::is_error);
    let config = match model {
        Some(model) if !has_errors => Some(Config {
            model,
            servers,
            settings: file.global_settings,
        }),
        _ => None,
    };
    Ok((config, issues))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn resolve_model(
    section: ModelSection,
    single_server: bool,
    env: &dyn Fn(&str) -> Option<String>,
    issues: &mut Vec<ConfigIssue>,
) -> Option<ModelConfig> {
    // Single-server mode keeps the historical default provider.
    let provider_name = section
        .provider
        .clone()
        .or_else(|| single_server.then(|| "anthropic".to_string()));

    let Some(provider_name) = provider_name else {
        issues.push(ConfigIssue::error(
            "model.provider",
            "a model block with a provider is required",
        ));
        return None;
    };
    let Some(provider) = ProviderKind::parse(&provider_name) else {
        issues.push(ConfigIssue::error(
            "model.provider",
            format!("unsupported provider '{provider_name}' (expected anthropic, qwen, dashscope or openai)"),
        ));
        return None;
    };

    let model = section
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| provider.default_model().to_string());

    let api_key = section
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| env(provider.api_key_env()).filter(|k| !k.trim().is_empty()));
    let Some(api_key) = api_key else {
        issues.push(ConfigIssue::error(
            "model.api_key",
            format!(
                "no credential: set model.api_key, pass --api-key, or export {}",
                provider.api_key_env()
            ),
        ));
        return None;
    };

    let max_tokens = section.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if max_tokens == 0 {
        issues.push(ConfigIssue::error("model.max_tokens", "must be greater than 0"));
        return None;
    }

    let base_url = section
        .base_url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| provider.default_base_url().to_string())
        .trim_end_matches('/')
        .to_string();

    Some(ModelConfig {
        provider,
        model,
        api_key,
        max_tokens,
        base_url,
        tool_protocol: section.tool_protocol.unwrap_or_default(),
    })
}

fn validate_servers(servers: &[ServerDescriptor], issues: &mut Vec<ConfigIssue>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for (i, server) in servers.iter().enumerate() {
        if server.name.trim().is_empty() {
            issues.push(ConfigIssue::error(
                format!("servers[{i}].name"),
                "server name must not be empty",
            ));
        } else if let Some(first) = seen.insert(server.name.as_str(), i) {
            // Keep the first index for later duplicates.
            seen.insert(server.name.as_str(), first);
            issues.push(ConfigIssue::error(
                format!("servers[{i}].name"),
                format!("duplicate server name '{}' (first declared at servers[{first}])", server.name),
            ));
        }

        if !server.enabled {
            continue;
        }

        if !server.script_path.exists() {
            issues.push(ConfigIssue::error(
                format!("servers[{i}].script_path"),
                format!("server script not found: {}", server.script_path.display()),
            ));
        }
        if let Err(msg) = server.launch_command() {
            issues.push(ConfigIssue::error(format!("servers[{i}].script_path"), msg));
        }
    }

    if servers.iter().all(|s| !s.enabled) {
        issues.push(ConfigIssue::warning("servers", "no enabled servers"));
    }
}

fn validate_settings(settings: &GlobalSettings, issues: &mut Vec<ConfigIssue>) {
    let positive = [
        ("concurrent_connections", settings.concurrent_connections as u64),
        ("connection_timeout", settings.connection_timeout),
        ("retry_attempts", u64::from(settings.retry_attempts)),
        ("tool_timeout", settings.tool_timeout),
        ("max_tool_rounds", u64::from(settings.max_tool_rounds)),
    ];
    for (field, value) in positive {
        if value == 0 {
            issues.push(ConfigIssue::error(
                format!("global_settings.{field}"),
                "must be greater than 0",
            ));
        }
    }
}
