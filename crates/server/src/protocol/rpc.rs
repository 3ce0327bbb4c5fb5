//! Raw JSON-RPC surface: `describe` and `execute`.

use hostbridge::ExecutionBridge;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Fault, Handler};

pub const NAME: &str = "Host RPC";
pub const VERSION: &str = "0.1";

pub(super) const METHODS: &[(&str, Handler)] = &[
    ("describe", Handler::Immediate(describe)),
    ("execute", Handler::Blocking(execute)),
];

#[derive(Debug, Deserialize)]
struct ExecuteParams {
    code: String,
}

#[allow(clippy::unnecessary_wraps)]
fn describe(_params: Value) -> Result<Value, Fault> {
    Ok(json!({
        "name": NAME,
        "version": VERSION,
        "methods": [{
            "name": "execute",
            "description": "Run a Lua snippet on the host's main thread.",
            "params": {"code": "string"},
            "returns": "the value of `result`, the chunk's return value, or parsed stdout",
        }],
    }))
}

fn execute(bridge: &ExecutionBridge, params: Value) -> Result<Value, Fault> {
    let ExecuteParams { code } = serde_json::from_value(params)?;
    let result = bridge.execute(&code);
    match result.failure {
        Some(failure) => Err(Fault::Execution {
            message: failure.message,
            trace: failure.trace,
        }),
        None => Ok(result.value.unwrap_or(Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hostbridge::{DEFAULT_TIMEOUT, DispatchQueue};

    use super::*;

    fn bridge() -> ExecutionBridge {
        ExecutionBridge::new(Arc::new(DispatchQueue::new()), DEFAULT_TIMEOUT)
    }

    #[test]
    fn describe_lists_execute() {
        let catalog = describe(Value::Null).unwrap();
        assert_eq!(catalog["name"], NAME);
        assert_eq!(catalog["methods"][0]["name"], "execute");
    }

    #[test]
    fn execute_requires_code() {
        let fault = execute(&bridge(), json!({})).unwrap_err();
        assert!(matches!(fault, Fault::InvalidParams(_)), "{fault}");
    }

    #[test]
    fn silent_snippets_return_null() {
        assert_eq!(execute(&bridge(), json!({"code": "local x = 1"})).unwrap(), Value::Null);
    }
}
