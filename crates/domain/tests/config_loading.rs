use std::fs;
use std::path::Path;

use mcx_domain::config::{
    check_with_env, load_with_env, ConflictPolicy, LoadRequest, ModelSection, ProviderKind,
    ToolProtocol,
};

fn no_env(_: &str) -> Option<String> {
    None
}

fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn multi_server_config_loads_with_relative_scripts() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "calculator.py", "");
    let cfg = write(
        dir.path(),
        "mcx.json",
        r#"{
            "model": { "provider": "qwen", "model": "qwen-turbo", "api_key": "sk-test", "max_tokens": 1000 },
            "servers": [
                { "name": "calculator", "description": "数学计算服务", "script_path": "calculator.py", "enabled": true },
                { "name": "weather", "script_path": "missing/weather.py", "enabled": false }
            ],
            "global_settings": { "concurrent_connections": 3, "connection_timeout": 10, "retry_attempts": 2 }
        }"#,
    );

    let req = LoadRequest {
        config_path: Some(cfg),
        ..Default::default()
    };
    let loaded = load_with_env(&req, &no_env).unwrap();
    let config = loaded.config;

    assert_eq!(config.model.provider, ProviderKind::DashScope);
    assert_eq!(config.model.model, "qwen-turbo");
    assert_eq!(config.model.tool_protocol, ToolProtocol::Native);
    assert_eq!(config.servers.len(), 2);
    assert_eq!(config.servers[0].script_path, dir.path().join("calculator.py"));
    assert_eq!(config.enabled_servers().count(), 1);
    assert_eq!(config.settings.concurrent_connections, 3);
    assert_eq!(config.settings.retry_attempts, 2);
    assert_eq!(config.settings.on_tool_conflict, ConflictPolicy::FirstWins);
    assert!(loaded.warnings.is_empty());
}

#[test]
fn command_line_overrides_win_over_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "calc.py", "");
    let cfg = write(
        dir.path(),
        "mcx.json",
        r#"{
            "model": { "provider": "anthropic", "model": "claude-3-5-sonnet-20241022" },
            "servers": [ { "name": "calc", "script_path": "calc.py" } ]
        }"#,
    );
    let req = LoadRequest {
        config_path: Some(cfg),
        script: None,
        overrides: ModelSection {
            model: Some("claude-3-haiku-20240307".into()),
            api_key: Some("cli-key".into()),
            max_tokens: Some(256),
            ..Default::default()
        },
    };
    let config = load_with_env(&req, &no_env).unwrap().config;
    assert_eq!(config.model.model, "claude-3-haiku-20240307");
    assert_eq!(config.model.api_key, "cli-key");
    assert_eq!(config.model.max_tokens, 256);
}

#[test]
fn missing_servers_list_and_credential_are_both_reported() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(dir.path(), "mcx.json", r#"{ "model": { "provider": "anthropic" } }"#);
    let req = LoadRequest {
        config_path: Some(cfg),
        ..Default::default()
    };

    let (config, issues) = check_with_env(&req, &no_env).unwrap();
    assert!(config.is_none());
    let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
    assert!(fields.contains(&"model.api_key"));
    assert!(fields.contains(&"servers"));

    let err = load_with_env(&req, &no_env).unwrap_err().to_string();
    assert!(err.contains("ANTHROPIC_API_KEY"));
    assert!(err.contains("a servers list is required"));
}

#[test]
fn single_server_mode_accepts_flat_model_file() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(dir.path(), "calculator.py", "");
    let cfg = write(
        dir.path(),
        "model.json",
        r#"{ "provider": "qwen", "model": "qwen-plus", "max_tokens": 800 }"#,
    );
    let env = |name: &str| (name == "DASHSCOPE_API_KEY").then(|| "env-key".to_string());
    let req = LoadRequest {
        config_path: Some(cfg),
        script: Some(script.clone()),
        ..Default::default()
    };
    let config = load_with_env(&req, &env).unwrap().config;
    assert_eq!(config.model.provider, ProviderKind::DashScope);
    assert_eq!(config.model.model, "qwen-plus");
    assert_eq!(config.model.max_tokens, 800);
    assert_eq!(config.model.api_key, "env-key");
    assert_eq!(config.servers.len(), 1);
    assert_eq!(config.servers[0].name, "calculator");
    assert_eq!(config.servers[0].script_path, script);
}

#[test]
fn single_server_mode_without_file_defaults_to_anthropic() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(dir.path(), "server.js", "");
    let env = |name: &str| (name == "ANTHROPIC_API_KEY").then(|| "a-key".to_string());
    let req = LoadRequest {
        script: Some(script),
        ..Default::default()
    };
    let config = load_with_env(&req, &env).unwrap().config;
    assert_eq!(config.model.provider, ProviderKind::Anthropic);
    assert_eq!(config.model.max_tokens, 1000);
    assert_eq!(config.servers[0].launch_command().unwrap().0, "node");
}

#[test]
fn malformed_file_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(dir.path(), "broken.json", "{ \"model\": ");
    let req = LoadRequest {
        config_path: Some(cfg),
        ..Default::default()
    };
    let err = check_with_env(&req, &no_env).unwrap_err().to_string();
    assert!(err.contains("broken.json"));
}

#[test]
fn all_disabled_servers_is_only_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(
        dir.path(),
        "mcx.json",
        r#"{
            "model": { "provider": "anthropic", "api_key": "k" },
            "servers": [ { "name": "weather", "script_path": "weather.py", "enabled": false } ]
        }"#,
    );
    let req = LoadRequest {
        config_path: Some(cfg),
        ..Default::default()
    };
    let loaded = load_with_env(&req, &no_env).unwrap();
    assert_eq!(loaded.config.enabled_servers().count(), 0);
    assert_eq!(loaded.warnings.len(), 1);
    assert_eq!(loaded.warnings[0].message, "no enabled servers");
}
