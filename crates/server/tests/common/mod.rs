#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use hostbridge::{DEFAULT_TIMEOUT, DispatchQueue, ExecutionBridge};
use hostbridge_server::{Dispatcher, Protocol, Server, Transport};
use serde_json::{Value, json};

/// A server for an ephemeral loopback port with no privileged context, so
/// snippets run in place on the blocking pool. Not yet listening.
pub fn unstarted_server(transport: Transport, protocol: Protocol) -> Server {
    let bridge = ExecutionBridge::new(Arc::new(DispatchQueue::new()), DEFAULT_TIMEOUT);
    Server::new(
        transport,
        SocketAddr::from(([127, 0, 0, 1], 0)),
        Dispatcher::new(protocol, bridge),
    )
}

pub async fn spawn_server(transport: Transport, protocol: Protocol) -> Result<(Server, SocketAddr)> {
    let server = unstarted_server(transport, protocol);
    let addr = server.start().await?;
    Ok((server, addr))
}

pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

pub fn execute_code(id: u64, code: &str) -> Value {
    request(
        id,
        "tools/call",
        json!({"name": "execute_code", "arguments": {"code": code}}),
    )
}

pub fn tool_text(reply: &Value) -> &str {
    reply["result"]["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
}
