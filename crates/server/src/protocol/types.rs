use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const INTERNAL_ERROR: i64 = -32603;

/// A decoded request. `id` is `None` for notifications; an explicit
/// `"id": null` is a request whose reply carries `null`.
#[derive(Debug)]
pub struct Request {
    pub id: Option<Value>,
    pub method: Option<String>,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ErrorObject),
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub const fn new(id: Value, outcome: Outcome) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome,
        }
    }

    pub const fn error(id: Value, error: ErrorObject) -> Self {
        Self::new(id, Outcome::Error(error))
    }

    /// Serialises, degrading to a bare internal error if the payload
    /// cannot be encoded.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            tracing::error!(?err, "failed to serialize response");
            let fallback = Self::error(
                self.id.clone(),
                ErrorObject::new(INTERNAL_ERROR, "Response serialization failed"),
            );
            serde_json::to_string(&fallback).unwrap_or_default()
        })
    }
}

/// Splits a raw message into a [`Request`], or the error reply for it.
pub fn parse(raw: &[u8]) -> Result<Request, Response> {
    let value: Value = serde_json::from_slice(raw).map_err(|err| {
        Response::error(
            Value::Null,
            ErrorObject::new(PARSE_ERROR, format!("Parse error: {err}")),
        )
    })?;

    let Value::Object(mut object) = value else {
        return Err(Response::error(
            Value::Null,
            ErrorObject::new(INVALID_REQUEST, "Invalid Request: expected a JSON object"),
        ));
    };

    let method = object
        .get("method")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    let params = match object.remove("params") {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(params) => params,
    };

    Ok(Request {
        id: object.remove("id"),
        method,
        params,
    })
}
