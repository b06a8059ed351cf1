//! Config file → connected servers → session → shell output, with in-memory
//! servers and a scripted model.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use mcx_cli::shell::{render_report, render_servers, render_tools};
use mcx_cli::ChatSession;
use mcx_domain::config::{load_with_env, Config, LoadRequest};
use mcx_domain::error::{Error, Result};
use mcx_domain::tool::ToolCall;
use mcx_mcp_client::testing::{FakeConnector, FakeServer};
use mcx_mcp_client::McpManager;
use mcx_providers::{ChatRequest, ChatResponse, LlmProvider};
use serde_json::{json, Value};

struct Scripted {
    replies: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl Scripted {
    fn new(replies: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for Scripted {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(req.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Other("script exhausted".into()))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

fn calls(calls: &[(&str, Value)]) -> ChatResponse {
    ChatResponse {
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall {
                call_id: format!("call_{i}"),
                tool_name: name.to_string(),
                arguments: args.clone(),
            })
            .collect(),
        finish_reason: Some("tool_calls".into()),
        ..Default::default()
    }
}

fn text(answer: &str) -> ChatResponse {
    ChatResponse {
        content: answer.into(),
        finish_reason: Some("stop".into()),
        ..Default::default()
    }
}

fn number_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "number": { "type": "number" } },
        "required": ["number"]
    })
}

fn pair_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
        "required": ["a", "b"]
    })
}

fn calculator(name: &str) -> FakeServer {
    FakeServer::new(name)
        .tool("add", pair_schema())
        .tool("square_root", number_schema())
        .respond("add", |args| {
            let a = args["a"].as_f64().unwrap_or_default();
            let b = args["b"].as_f64().unwrap_or_default();
            Ok((a + b).to_string())
        })
        .respond("square_root", |args| {
            Ok(args["number"].as_f64().unwrap_or_default().sqrt().to_string())
        })
}

fn load(dir: &Path, servers: Value) -> Config {
    for server in servers.as_array().unwrap() {
        if let Some(script) = server["script_path"].as_str() {
            fs::write(dir.join(script), "").unwrap();
        }
    }
    let body = json!({
        "model": { "provider": "qwen", "model": "qwen-turbo" },
        "servers": servers,
        "global_settings": { "retry_attempts": 1 }
    });
    let path = dir.join("servers.json");
    fs::write(&path, body.to_string()).unwrap();

    let req = LoadRequest {
        config_path: Some(path),
        ..Default::default()
    };
    let env = |name: &str| (name == "DASHSCOPE_API_KEY").then(|| "sk-env".to_string());
    load_with_env(&req, &env).unwrap().config
}

#[tokio::test(start_paused = true)]
async fn square_root_query_routes_to_calculator() {
    let dir = tempfile::tempdir().unwrap();
    let config = load(
        dir.path(),
        json!([
            { "name": "calculator", "description": "数学计算服务", "script_path": "calculator.py" },
            { "name": "weather", "description": "天气查询服务", "script_path": "weather.py", "enabled": false }
        ]),
    );
    let connector = FakeConnector::new()
        .with_server("calculator", calculator("calculator"))
        .with_server("weather", FakeServer::new("weather").tool("get_weather", json!({ "type": "object" })));
    let manager = McpManager::connect_all(&config.servers, &config.settings, &connector)
        .await
        .unwrap();

    assert_eq!(connector.attempts("weather"), 0);
    let tools = render_tools(manager.registry());
    assert!(tools.contains("square_root -> calculator"));
    assert!(!tools.contains("get_weather"));
    assert!(render_servers(&manager).contains("calculator: 数学计算服务 (2 tools)"));

    let provider = Scripted::new(vec![
        calls(&[("square_root", json!({ "number": 15 }))]),
        text("15 的平方根约为 3.873"),
    ]);
    let mut session = ChatSession::new(provider.clone(), manager, &config.settings);

    let report = session.ask("计算 15 的平方根").await.unwrap();

    assert_eq!(report.tool_calls.len(), 1);
    assert_eq!(report.tool_calls[0].server.as_deref(), Some("calculator"));
    assert!(report.tool_calls[0].content.starts_with("3.87"));
    assert_eq!(
        render_report(&report),
        "[called square_root on calculator with {\"number\":15}]\n15 的平方根约为 3.873"
    );

    let recorded = connector.calls();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].server, "calculator");
    assert_eq!(recorded[0].arguments, json!({ "number": 15 }));

    // The tool result went back to the model before it answered.
    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 3);

    drop(requests);
    session.shutdown().await;
    assert_eq!(connector.shutdowns(), vec!["calculator".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn duplicate_tool_names_go_to_the_first_server() {
    let dir = tempfile::tempdir().unwrap();
    let config = load(
        dir.path(),
        json!([
            { "name": "calculator", "script_path": "calculator.py" },
            { "name": "backup_calc", "script_path": "backup_calc.py" }
        ]),
    );
    let connector = FakeConnector::new()
        .with_server("calculator", calculator("calculator"))
        .with_server(
            "backup_calc",
            FakeServer::new("backup_calc")
                .tool("add", pair_schema())
                .respond("add", |_| Ok("wrong server".into())),
        );
    let manager = McpManager::connect_all(&config.servers, &config.settings, &connector)
        .await
        .unwrap();

    let tools = render_tools(manager.registry());
    assert!(tools.contains("add -> calculator"));
    assert!(tools.contains("Conflicts:\n  - add: using calculator, ignored backup_calc"));

    let provider = Scripted::new(vec![calls(&[("add", json!({ "a": 2, "b": 3 }))]), text("5")]);
    let mut session = ChatSession::new(provider, manager, &config.settings);
    let report = session.ask("2 + 3?").await.unwrap();

    assert_eq!(report.tool_calls[0].content, "5");
    assert_eq!(connector.calls()[0].server, "calculator");
}

#[tokio::test(start_paused = true)]
async fn unreachable_server_is_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = load(
        dir.path(),
        json!([
            { "name": "calculator", "script_path": "calculator.py" },
            { "name": "broken", "description": "never starts", "script_path": "broken.py" }
        ]),
    );
    let connector = FakeConnector::new().with_server("calculator", calculator("calculator"));
    let manager = McpManager::connect_all(&config.servers, &config.settings, &connector)
        .await
        .unwrap();

    assert_eq!(manager.server_count(), 1);
    let servers = render_servers(&manager);
    assert!(servers.contains("Unreachable servers (1):"));
    assert!(servers.contains("broken: never starts (failed after 1 attempts"));
    assert!(!render_tools(manager.registry()).contains("broken"));
}
