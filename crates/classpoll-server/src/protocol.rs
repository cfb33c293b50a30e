//! JSON-RPC 2.0 wire types carried over WebSocket text frames.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use classpoll_core::CommandError;
use classpoll_core::types::{AnswerValue, PollDraft, Role};
use classpoll_engine::RoomEvent;

fn default_jsonrpc() -> String {
    "2.0".into()
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn ok(id: Option<u64>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<u64>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    /// Machine-readable detail, currently `{"kind": ...}` for domain errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self {
            code: -32700,
            message: format!("parse error: {detail}"),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("method not found: {method}"),
            data: None,
        }
    }

    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self {
            code: -32602,
            message: format!("invalid params: {detail}"),
            data: None,
        }
    }
}

/// Domain rejections all map to the JSON-RPC server-error code; the
/// `data.kind` field carries the stable discriminant for clients.
impl From<CommandError> for JsonRpcError {
    fn from(err: CommandError) -> Self {
        Self {
            code: -32000,
            message: err.to_string(),
            data: Some(serde_json::json!({ "kind": err.kind() })),
        }
    }
}

/// Server-initiated push (no `id`).
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

/// Render an engine event as a push notification. The event's tag
/// becomes the method and its payload the params.
pub fn event_to_notification(event: &RoomEvent) -> JsonRpcNotification {
    let value = serde_json::json!(event);
    let method = value["type"].as_str().unwrap_or("event").to_string();
    let params = value.get("data").cloned().unwrap_or(serde_json::json!({}));
    JsonRpcNotification {
        jsonrpc: "2.0".into(),
        method,
        params,
    }
}

// ---------------------------------------------------------------------------
// Request params
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JoinParams {
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SubmitParams {
    pub value: AnswerValue,
}

#[derive(Debug, Deserialize)]
pub struct RemoveStudentParams {
    pub participant_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageParams {
    pub text: String,
}

/// `create_poll` takes the draft fields directly as params.
pub type CreatePollParams = PollDraft;
