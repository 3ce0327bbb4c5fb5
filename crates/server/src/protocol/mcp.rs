//! Model Context Protocol surface: a handshake, a tool listing and a single
//! `execute_code` tool.

use hostbridge::{ExecutionBridge, ExecutionResult};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Fault, Handler};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "hostbridge-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const TOOL_NAME: &str = "execute_code";

pub(super) const METHODS: &[(&str, Handler)] = &[
    ("initialize", Handler::Immediate(initialize)),
    ("tools/list", Handler::Immediate(tools_list)),
    ("tools/call", Handler::Blocking(tools_call)),
];

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: Option<String>,
    #[serde(default)]
    arguments: Option<ToolArguments>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolArguments {
    #[serde(default)]
    code: String,
}

#[allow(clippy::unnecessary_wraps)]
fn initialize(_params: Value) -> Result<Value, Fault> {
    Ok(json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {"tools": {}},
        "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
    }))
}

#[allow(clippy::unnecessary_wraps)]
fn tools_list(_params: Value) -> Result<Value, Fault> {
    Ok(json!({
        "tools": [{
            "name": TOOL_NAME,
            "description": "Execute Lua code on the host's main thread with the `host` API bound.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Lua code to execute. Assign `result = ...` to return a value.",
                    }
                },
                "required": ["code"],
            },
        }]
    }))
}

fn tools_call(bridge: &ExecutionBridge, params: Value) -> Result<Value, Fault> {
    let params: ToolCallParams = serde_json::from_value(params)?;
    match params.name.as_deref() {
        Some(TOOL_NAME) => {}
        other => return Err(Fault::UnknownTool(other.unwrap_or("<none>").to_owned())),
    }

    let code = params.arguments.unwrap_or_default().code;
    Ok(format_tool_result(&bridge.execute(&code)))
}

/// Renders an execution as MCP tool content.
#[must_use]
pub fn format_tool_result(result: &ExecutionResult) -> Value {
    if let Some(failure) = &result.failure {
        return json!({
            "content": [{"type": "text", "text": format!("Error: {}", failure.message)}],
            "isError": true,
        });
    }

    let mut parts = Vec::new();
    if let Some(value) = &result.value {
        parts.push(format!("Result: {value}"));
    }
    if !result.output.is_empty() {
        parts.push(format!("Output:\n{}", result.output));
    }
    if !result.stderr.is_empty() {
        parts.push(format!("Stderr:\n{}", result.stderr));
    }

    let text = if parts.is_empty() {
        "Code executed successfully.".to_owned()
    } else {
        parts.join("\n")
    };
    json!({"content": [{"type": "text", "text": text}]})
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn empty_runs_report_success() {
        let formatted = format_tool_result(&ExecutionResult::default());
        assert_eq!(formatted["content"][0]["text"], "Code executed successfully.");
    }

    #[test]
    fn sections_are_joined_in_order() {
        let result = ExecutionResult {
            value: Some(json!({"n": 1})),
            output: "out\n".to_owned(),
            stderr: "err\n".to_owned(),
            failure: None,
        };
        assert_eq!(
            format_tool_result(&result)["content"][0]["text"],
            "Result: {\"n\":1}\nOutput:\nout\n\nStderr:\nerr\n"
        );
    }

    #[test]
    fn timeouts_surface_as_tool_errors() {
        let formatted = format_tool_result(&ExecutionResult::timed_out(Duration::from_secs(300)));
        assert_eq!(formatted["isError"], true);
        assert_eq!(
            formatted["content"][0]["text"],
            "Error: Execution timed out after 300s"
        );
    }
}
