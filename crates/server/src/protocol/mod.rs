//! JSON-RPC 2.0 dispatch shared by every transport.

pub mod mcp;
pub mod rpc;
pub mod types;

use std::{collections::HashMap, fmt, str::FromStr};

use hostbridge::ExecutionBridge;
use serde_json::{Value, json};
use tokio::task::JoinError;

use self::types::{ErrorObject, INTERNAL_ERROR, Outcome, Response};
use crate::{config::ConfigError, transport::Transport};

/// Which method registry a server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Mcp,
    Rpc,
}

impl Protocol {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mcp => "MCP",
            Self::Rpc => "JSON-RPC",
        }
    }

    const fn methods(self) -> &'static [(&'static str, Handler)] {
        match self {
            Self::Mcp => mcp::METHODS,
            Self::Rpc => rpc::METHODS,
        }
    }

    /// The static document served on `GET /`.
    #[must_use]
    pub fn identity(self, transport: Transport) -> Value {
        let (name, version, protocol_version) = match self {
            Self::Mcp => (mcp::SERVER_NAME, mcp::SERVER_VERSION, mcp::PROTOCOL_VERSION),
            Self::Rpc => (rpc::NAME, rpc::VERSION, types::JSONRPC_VERSION),
        };
        json!({
            "name": name,
            "version": version,
            "protocol": self.label(),
            "protocolVersion": protocol_version,
            "transport": transport.label(),
        })
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mcp => "mcp",
            Self::Rpc => "rpc",
        })
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mcp" => Ok(Self::Mcp),
            "rpc" | "jsonrpc" | "json-rpc" => Ok(Self::Rpc),
            _ => Err(ConfigError::unrecognized("protocol", s, "mcp, rpc")),
        }
    }
}

/// A registered method body.
///
/// Immediate handlers answer inline on the connection task. Blocking ones may
/// park on the [`ExecutionBridge`] and are moved to tokio's blocking pool.
#[derive(Clone, Copy)]
pub enum Handler {
    Immediate(fn(Value) -> Result<Value, Fault>),
    Blocking(fn(&ExecutionBridge, Value) -> Result<Value, Fault>),
}

/// A handler failure, reported as a `-32603` error envelope.
#[derive(Debug, thiserror::Error)]
pub enum Fault {
    #[error("Method '{0}' not supported")]
    MethodNotFound(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid params: {0}")]
    InvalidParams(#[from] serde_json::Error),
    #[error("{message}")]
    Execution { message: String, trace: String },
    #[error("handler task failed: {0}")]
    Join(#[from] JoinError),
}

impl Fault {
    #[must_use]
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::Execution { trace, .. } => Some(Value::String(trace.clone())),
            _ => None,
        }
    }

    fn into_error(self) -> ErrorObject {
        ErrorObject {
            code: INTERNAL_ERROR,
            data: self.data(),
            message: self.to_string(),
        }
    }
}

pub struct Dispatcher {
    protocol: Protocol,
    methods: HashMap<&'static str, Handler>,
    bridge: ExecutionBridge,
}

impl Dispatcher {
    #[must_use]
    pub fn new(protocol: Protocol, bridge: ExecutionBridge) -> Self {
        Self {
            protocol,
            methods: protocol.methods().iter().copied().collect(),
            bridge,
        }
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Handles one raw message. `None` means nothing goes back on the wire.
    pub async fn dispatch(&self, raw: &[u8]) -> Option<String> {
        let request = match types::parse(raw) {
            Ok(request) => request,
            Err(reply) => {
                tracing::debug!("rejected malformed message");
                return Some(reply.encode());
            }
        };

        let Some(id) = request.id else {
            tracing::debug!(method = ?request.method, "notification received");
            return None;
        };

        let method = request.method.unwrap_or_default();
        tracing::debug!(%method, %id, "dispatching request");
        let outcome = match self.call(&method, request.params).await {
            Ok(value) => Outcome::Result(value),
            Err(fault) => {
                tracing::warn!(%method, %fault, "request failed");
                Outcome::Error(fault.into_error())
            }
        };
        Some(Response::new(id, outcome).encode())
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, Fault> {
        let handler = *self
            .methods
            .get(method)
            .ok_or_else(|| Fault::MethodNotFound(method.to_owned()))?;

        match handler {
            Handler::Immediate(handler) => handler(params),
            Handler::Blocking(handler) => {
                let bridge = self.bridge.clone();
                tokio::task::spawn_blocking(move || handler(&bridge, params)).await?
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hostbridge::{DEFAULT_TIMEOUT, DispatchQueue};

    use super::*;

    fn dispatcher(protocol: Protocol) -> Dispatcher {
        let bridge = ExecutionBridge::new(Arc::new(DispatchQueue::new()), DEFAULT_TIMEOUT);
        Dispatcher::new(protocol, bridge)
    }

    async fn call(dispatcher: &Dispatcher, request: Value) -> Value {
        let reply = dispatcher
            .dispatch(request.to_string().as_bytes())
            .await
            .expect("reply");
        serde_json::from_str(&reply).unwrap()
    }

    fn tool_call(code: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "execute_code", "arguments": {"code": code}},
        })
    }

    #[tokio::test]
    async fn parse_errors_carry_a_null_id() {
        let reply = dispatcher(Protocol::Mcp).dispatch(b"{oops").await.unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["jsonrpc"], "2.0");
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn notifications_produce_no_reply() {
        let dispatcher = dispatcher(Protocol::Mcp);
        let reply = dispatcher
            .dispatch(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());

        // even for methods that would run code
        let mut request = tool_call("result = 1");
        request.as_object_mut().unwrap().remove("id");
        assert!(dispatcher.dispatch(request.to_string().as_bytes()).await.is_none());
    }

    #[tokio::test]
    async fn unknown_methods_are_internal_errors() {
        let reply = call(
            &dispatcher(Protocol::Mcp),
            json!({"jsonrpc": "2.0", "id": 9, "method": "resources/list"}),
        )
        .await;
        assert_eq!(reply["id"], 9);
        assert_eq!(reply["error"]["code"], -32603);
        assert_eq!(reply["error"]["message"], "Method 'resources/list' not supported");
    }

    #[tokio::test]
    async fn initialize_handshake() {
        let reply = call(
            &dispatcher(Protocol::Mcp),
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        )
        .await;
        assert_eq!(reply["result"]["protocolVersion"], mcp::PROTOCOL_VERSION);
        assert_eq!(reply["result"]["serverInfo"]["name"], mcp::SERVER_NAME);
        assert_eq!(reply["result"]["capabilities"], json!({"tools": {}}));
    }

    #[tokio::test]
    async fn tools_list_without_params() {
        let reply = call(
            &dispatcher(Protocol::Mcp),
            json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"}),
        )
        .await;
        assert_eq!(reply["id"], "a");
        let tools = reply["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], mcp::TOOL_NAME);
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["code"]));
    }

    #[tokio::test]
    async fn tools_call_reports_the_result() {
        let reply = call(&dispatcher(Protocol::Mcp), tool_call("result = 5 + 3")).await;
        let text = reply["result"]["content"][0]["text"].as_str().unwrap();
        assert_eq!(text, "Result: 8");
        assert!(reply["result"].get("isError").is_none());
    }

    #[tokio::test]
    async fn tools_call_faults_are_tool_level_errors() {
        let dispatcher = dispatcher(Protocol::Mcp);
        let reply = call(&dispatcher, tool_call("error('test error')")).await;
        assert_eq!(reply["result"]["isError"], true);
        let text = reply["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Error: "), "{text}");
        assert!(text.contains("test error"), "{text}");

        let reply = call(&dispatcher, tool_call("print('still alive')")).await;
        assert_eq!(
            reply["result"]["content"][0]["text"],
            "Result: \"still alive\"\nOutput:\nstill alive\n"
        );
    }

    #[tokio::test]
    async fn unknown_tools_are_protocol_errors() {
        let reply = call(
            &dispatcher(Protocol::Mcp),
            json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": {"name": "unknown_tool", "arguments": {}},
            }),
        )
        .await;
        assert_eq!(reply["error"]["code"], -32603);
        assert!(reply["error"]["message"].as_str().unwrap().contains("unknown_tool"));
    }

    #[tokio::test]
    async fn rpc_registry_is_separate() {
        let dispatcher = dispatcher(Protocol::Rpc);
        let reply = call(&dispatcher, tool_call("result = 1")).await;
        assert_eq!(reply["error"]["message"], "Method 'tools/call' not supported");

        let reply = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 1, "method": "execute", "params": {"code": "result = {1, 2}"}}),
        )
        .await;
        assert_eq!(reply["result"], json!([1, 2]));
    }

    #[tokio::test]
    async fn rpc_execute_faults_carry_the_trace() {
        let reply = call(
            &dispatcher(Protocol::Rpc),
            json!({"jsonrpc": "2.0", "id": 2, "method": "execute", "params": {"code": "error('bad')"}}),
        )
        .await;
        assert_eq!(reply["error"]["code"], -32603);
        assert!(reply["error"]["message"].as_str().unwrap().contains("bad"));
        assert!(reply["error"]["data"].as_str().unwrap().contains("bad"));
    }

    #[test]
    fn protocols_parse_from_config_values() {
        assert_eq!("MCP".parse::<Protocol>().unwrap(), Protocol::Mcp);
        assert_eq!("rpc".parse::<Protocol>().unwrap(), Protocol::Rpc);
        assert!("grpc".parse::<Protocol>().is_err());
    }
}
