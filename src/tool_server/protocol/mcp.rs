//! MCP method payloads for handshake, discovery, and invocation.

use super::ProtocolError;
use crate::tool_server::domain::ToolSchema;
use serde::Deserialize;
use serde_json::{Value, json};

/// MCP protocol revision announced during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method names used on the wire.
pub mod methods {
    /// Handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Handshake completion notification.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Tool discovery request.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Tool invocation request.
    pub const TOOLS_CALL: &str = "tools/call";
    /// Liveness probe, valid in both directions.
    pub const PING: &str = "ping";
    /// Server announcement that its tool catalog changed.
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    /// Server log message.
    pub const LOG_MESSAGE: &str = "notifications/message";
}

/// Parameters for the `initialize` request.
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// Decoded `initialize` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol revision chosen by the server.
    pub protocol_version: String,
    /// Server name, when reported.
    #[serde(default, deserialize_with = "server_name")]
    pub server_info: Option<String>,
}

fn server_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Info {
        name: String,
    }
    Ok(Option::<Info>::deserialize(deserializer)?.map(|info| info.name))
}

/// Decodes an `initialize` result.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedResult`] when the payload lacks a
/// protocol version.
pub fn decode_initialize(result: Value) -> Result<InitializeResult, ProtocolError> {
    serde_json::from_value(result).map_err(|err| ProtocolError::UnexpectedResult {
        method: methods::INITIALIZE,
        reason: err.to_string(),
    })
}

/// Parameters for one `tools/list` page.
#[must_use]
pub fn list_tools_params(cursor: Option<&str>) -> Option<Value> {
    cursor.map(|value| json!({"cursor": value}))
}

/// One page of discovered tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolsPage {
    /// Tools on this page.
    pub tools: Vec<ToolSchema>,
    /// Cursor for the next page, absent on the last page.
    pub next_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToolsPage {
    #[serde(default)]
    tools: Vec<RawTool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Option<Value>,
}

/// Decodes a `tools/list` result.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedResult`] when the payload does not
/// have the documented shape or a tool has an empty name.
pub fn decode_tools_page(result: Value) -> Result<ToolsPage, ProtocolError> {
    let unexpected = |reason: String| ProtocolError::UnexpectedResult {
        method: methods::TOOLS_LIST,
        reason,
    };
    let raw: RawToolsPage =
        serde_json::from_value(result).map_err(|err| unexpected(err.to_string()))?;
    let tools = raw
        .tools
        .into_iter()
        .map(|tool| {
            ToolSchema::new(
                tool.name,
                tool.description.unwrap_or_default(),
                tool.input_schema
                    .unwrap_or_else(|| json!({"type": "object"})),
            )
            .map_err(|err| unexpected(err.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ToolsPage {
        tools,
        next_cursor: raw.next_cursor.filter(|cursor| !cursor.is_empty()),
    })
}

/// Parameters for a `tools/call` request.
#[must_use]
pub fn call_tool_params(name: &str, arguments: Value) -> Value {
    json!({"name": name, "arguments": arguments})
}

/// Outcome of a `tools/call` result payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CallToolOutcome {
    /// The tool succeeded; the full result payload.
    Success(Value),
    /// The tool reported `isError: true`; the full result payload and the
    /// first text content item, if any.
    ToolError {
        /// Text of the first content item.
        message: String,
        /// Result payload, passed through verbatim.
        payload: Value,
    },
}

/// Interprets a `tools/call` result.
#[must_use]
pub fn decode_call_result(result: Value) -> CallToolOutcome {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !is_error {
        return CallToolOutcome::Success(result);
    }

    let message = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str)
        .unwrap_or("tool reported an error")
        .to_owned();
    CallToolOutcome::ToolError {
        message,
        payload: result,
    }
}

/// A server log message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogMessage {
    /// Severity as reported by the server.
    #[serde(default)]
    pub level: String,
    /// Logger name.
    #[serde(default)]
    pub logger: Option<String>,
    /// Message payload.
    #[serde(default)]
    pub data: Value,
}

/// Notifications the manager reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerNotification {
    /// The server's tool catalog changed.
    ToolsListChanged,
    /// The server emitted a log line.
    Log(LogMessage),
    /// Any other notification.
    Other(String),
}

impl ServerNotification {
    /// Interprets a notification by method name.
    #[must_use]
    pub fn from_parts(method: &str, params: Option<Value>) -> Self {
        match method {
            methods::TOOLS_LIST_CHANGED => Self::ToolsListChanged,
            methods::LOG_MESSAGE => params
                .and_then(|value| serde_json::from_value(value).ok())
                .map_or_else(|| Self::Other(method.to_owned()), Self::Log),
            _ => Self::Other(method.to_owned()),
        }
    }
}
