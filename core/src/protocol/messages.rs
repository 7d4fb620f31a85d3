//! JSON-RPC 2.0 envelopes and tool-call result payloads.

use crate::errors::ProtocolError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Decoded request line.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Absent for notifications; an explicit `null` is kept as `Some(Value::Null)`
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Any value that is present, `null` included.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RpcRequest {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ProtocolError::Parse(e.to_string()))?;
        if !value.is_object() {
            return Err(ProtocolError::InvalidRequest(
                "expected a single JSON-RPC request object".to_string(),
            ));
        }
        let request: RpcRequest = serde_json::from_value(value)
            .map_err(|e| ProtocolError::InvalidRequest(e.to_string()))?;
        if let Some(version) = &request.jsonrpc {
            if version != JSONRPC_VERSION {
                return Err(ProtocolError::InvalidRequest(format!(
                    "unsupported jsonrpc version: {}",
                    version
                )));
            }
        }
        Ok(request)
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Build a success response.
pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

/// Build an error response.
pub fn error_response(id: Value, error: &ProtocolError) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": error.code(),
            "message": error.to_string(),
        },
    })
}

/// One content block of a tool-call result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

/// Result of `tools/call`.
///
/// `is_error` distinguishes a reported failure from a successful result that
/// merely contains failure-shaped data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<TextContent>,
    pub is_error: bool,
}

impl CallToolResult {
    pub fn success(value: &Value) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self {
            content: vec![TextContent { kind: "text", text }],
            is_error: false,
        }
    }

    /// Error-flagged result whose payload is `{"error": message}`.
    pub fn failure(message: impl Into<String>) -> Self {
        let text = json!({ "error": message.into() }).to_string();
        Self {
            content: vec![TextContent { kind: "text", text }],
            is_error: true,
        }
    }

    /// Concatenated text of all content blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
