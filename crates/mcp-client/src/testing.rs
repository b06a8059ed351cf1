//! In-memory MCP servers for tests.
//!
//! [`FakeServer`] scripts what a server advertises and how its tools
//! answer; [`FakeTransport`] speaks JSON-RPC on its behalf and
//! [`FakeConnector`] hands such transports to the manager in place of real
//! child processes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::McpError;
use crate::manager::Connector;
use crate::protocol::{JsonRpcResponse, McpToolDef, ToolCallParams, PROTOCOL_VERSION};
use crate::transport::{McpTransport, TransportError};
use mcx_domain::config::ServerDescriptor;

/// A tool implementation: `Ok(text)` for a result, `Err(text)` for a
/// result flagged `isError`.
pub type ToolHandler = Arc<dyn Fn(&Value) -> Result<String, String> + Send + Sync>;

/// A scripted MCP server.
#[derive(Clone)]
pub struct FakeServer {
    name: String,
    tools: Vec<McpToolDef>,
    handlers: HashMap<String, ToolHandler>,
    fail_initialize: bool,
    malformed_initialize: bool,
    handshake_delay: Option<Duration>,
    call_delay: Option<Duration>,
}

impl FakeServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            handlers: HashMap::new(),
            fail_initialize: false,
            malformed_initialize: false,
            handshake_delay: None,
            call_delay: None,
        }
    }

    /// Advertise a tool with the given input schema.
    pub fn tool(mut self, name: &str, input_schema: Value) -> Self {
        self.tools.push(McpToolDef {
            name: name.into(),
            description: format!("{name} tool"),
            input_schema,
        });
        self
    }

    /// Answer calls to `name` with `handler`.
    pub fn respond<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<String, String> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Reply to `initialize` with a JSON-RPC error.
    pub fn fail_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Reply to `initialize` with a result that does not parse.
    pub fn malformed_initialize(mut self) -> Self {
        self.malformed_initialize = true;
        self
    }

    /// Delay the `initialize` reply.
    pub fn slow_handshake(mut self, delay: Duration) -> Self {
        self.handshake_delay = Some(delay);
        self
    }

    /// Delay every `tools/call` reply.
    pub fn slow_calls(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }
}

/// One `tools/call` received by a fake server.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub server: String,
    pub tool: String,
    pub arguments: Value,
}

#[derive(Default)]
struct Journal {
    methods: Mutex<Vec<String>>,
    calls: Mutex<Vec<RecordedCall>>,
    shutdowns: Mutex<Vec<String>>,
    handshaking: AtomicUsize,
    peak_handshaking: AtomicUsize,
}

fn locked<T: Clone>(m: &Mutex<T>) -> T {
    m.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn push<T>(m: &Mutex<Vec<T>>, item: T) {
    m.lock().unwrap_or_else(PoisonError::into_inner).push(item);
}

/// A transport answering on behalf of a [`FakeServer`].
pub struct FakeTransport {
    server: FakeServer,
    journal: Arc<Journal>,
    alive: AtomicBool,
}

impl FakeTransport {
    pub fn new(server: FakeServer) -> Self {
        Self::with_journal(server, Arc::default())
    }

    fn with_journal(server: FakeServer, journal: Arc<Journal>) -> Self {
        Self {
            server,
            journal,
            alive: AtomicBool::new(true),
        }
    }

    /// Every method received so far, requests and notifications alike.
    pub fn methods(&self) -> Vec<String> {
        locked(&self.journal.methods)
    }

    fn answer_call(&self, id: u64, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params.and_then(|p| serde_json::from_value::<ToolCallParams>(p).ok()) else {
            return JsonRpcResponse::failure(id, -32602, "invalid params");
        };
        push(
            &self.journal.calls,
            RecordedCall {
                server: self.server.name.clone(),
                tool: params.name.clone(),
                arguments: params.arguments.clone(),
            },
        );
        match self.server.handlers.get(&params.name) {
            Some(handler) => {
                let (text, is_error) = match handler(&params.arguments) {
                    Ok(text) => (text, false),
                    Err(text) => (text, true),
                };
                JsonRpcResponse::success(
                    id,
                    json!({ "content": [{ "type": "text", "text": text }], "isError": is_error }),
                )
            }
            None => JsonRpcResponse::failure(id, -32601, format!("Unknown tool: {}", params.name)),
        }
    }
}

#[async_trait]
impl McpTransport for FakeTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        if !self.is_alive() {
            return Err(TransportError::ProcessExited);
        }
        push(&self.journal.methods, method.to_string());
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        let resp = match method {
            "initialize" => {
                let now = self.journal.handshaking.fetch_add(1, Ordering::SeqCst) + 1;
                self.journal.peak_handshaking.fetch_max(now, Ordering::SeqCst);
                if let Some(delay) = self.server.handshake_delay {
                    tokio::time::sleep(delay).await;
                }
                self.journal.handshaking.fetch_sub(1, Ordering::SeqCst);

                if self.server.fail_initialize {
                    JsonRpcResponse::failure(id, -32603, "initialization failed")
                } else if self.server.malformed_initialize {
                    JsonRpcResponse::success(id, json!({ "protocolVersion": 20241105, "serverInfo": "calc" }))
                } else {
                    JsonRpcResponse::success(
                        id,
                        json!({
                            "protocolVersion": PROTOCOL_VERSION,
                            "capabilities": { "tools": {} },
                            "serverInfo": { "name": self.server.name, "version": "0.0.0" }
                        }),
                    )
                }
            }
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": self.server.tools })),
            "tools/call" => {
                if let Some(delay) = self.server.call_delay {
                    tokio::time::sleep(delay).await;
                }
                self.answer_call(id, params)
            }
            other => JsonRpcResponse::failure(id, -32601, format!("Method not found: {other}")),
        };
        Ok(resp)
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::ProcessExited);
        }
        push(&self.journal.methods, method.to_string());
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        push(&self.journal.shutdowns, self.server.name.clone());
    }
}

/// A [`Connector`] that launches [`FakeServer`]s by descriptor name.
#[derive(Default)]
pub struct FakeConnector {
    servers: HashMap<String, FakeServer>,
    failing_launches: Mutex<HashMap<String, u32>>,
    attempts: Mutex<HashMap<String, u32>>,
    journal: Arc<Journal>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `server` under the descriptor name `name`.
    pub fn with_server(mut self, name: &str, server: FakeServer) -> Self {
        self.servers.insert(name.into(), server);
        self
    }

    /// Make the next `count` launches of `name` fail.
    pub fn failing_launches(self, name: &str, count: u32) -> Self {
        self.failing_launches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), count);
        self
    }

    /// Launch attempts made for `name`.
    pub fn attempts(&self, name: &str) -> u32 {
        locked(&self.attempts).get(name).copied().unwrap_or(0)
    }

    /// Every tool call received by any launched server, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        locked(&self.journal.calls)
    }

    /// Most `initialize` requests that were ever waiting for a reply at once.
    pub fn peak_handshakes(&self) -> usize {
        self.journal.peak_handshaking.load(Ordering::SeqCst)
    }

    /// Server names whose transports were shut down, in order.
    pub fn shutdowns(&self) -> Vec<String> {
        locked(&self.journal.shutdowns)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn launch(&self, server: &ServerDescriptor) -> Result<Box<dyn McpTransport>, McpError> {
        *self
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(server.name.clone())
            .or_default() += 1;

        {
            let mut failing = self.failing_launches.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(remaining) = failing.get_mut(&server.name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(McpError::Launch {
                        server: server.name.clone(),
                        message: "simulated launch failure".into(),
                    });
                }
            }
        }

        match self.servers.get(&server.name) {
            Some(fake) => Ok(Box::new(FakeTransport::with_journal(
                fake.clone(),
                self.journal.clone(),
            ))),
            None => Err(McpError::Launch {
                server: server.name.clone(),
                message: format!("No such file or directory: {}", server.script_path.display()),
            }),
        }
    }
}
