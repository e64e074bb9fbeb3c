//! JSON-RPC 2.0 envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Protocol version string carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for unsupported methods.
pub const METHOD_NOT_FOUND: i64 = -32_601;

/// A malformed or unrecognised message received from a tool server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),

    /// The frame exceeds the configured size limit.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge {
        /// Observed size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The frame is JSON but not a JSON-RPC 2.0 envelope.
    #[error("frame is not a JSON-RPC 2.0 message: {0}")]
    InvalidEnvelope(String),

    /// A response payload does not match the expected method shape.
    #[error("unexpected {method} result: {reason}")]
    UnexpectedResult {
        /// Method whose result was malformed.
        method: &'static str,
        /// Decoder detail.
        reason: String,
    },
}

/// Error object carried in a JSON-RPC error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to a request we issued.
    Response {
        /// Correlation id, or `None` when the id is not one we could have
        /// issued.
        id: Option<u64>,
        /// Result payload or error object.
        outcome: Result<Value, RpcErrorObject>,
    },
    /// Server-initiated request expecting a reply.
    Request {
        /// Server-chosen id, echoed verbatim in the reply.
        id: Value,
        /// Method name.
        method: String,
        /// Parameters, if any.
        params: Option<Value>,
    },
    /// Server-initiated notification.
    Notification {
        /// Method name.
        method: String,
        /// Parameters, if any.
        params: Option<Value>,
    },
}

impl Inbound {
    /// Classifies one decoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidEnvelope`] when the frame is not a
    /// JSON-RPC 2.0 object or carries neither a method nor a result.
    pub fn classify(frame: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut object) = frame else {
            return Err(ProtocolError::InvalidEnvelope(
                "expected a JSON object".to_owned(),
            ));
        };
        match object.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            other => {
                return Err(ProtocolError::InvalidEnvelope(format!(
                    "unsupported jsonrpc version {other:?}"
                )));
            }
        }

        let id = object.remove("id");
        let params = object.remove("params");
        if let Some(Value::String(method)) = object.remove("method") {
            return Ok(match id {
                Some(request_id) if !request_id.is_null() => Self::Request {
                    id: request_id,
                    method,
                    params,
                },
                _ => Self::Notification { method, params },
            });
        }

        let outcome = decode_outcome(&mut object)?;
        Ok(Self::Response {
            id: id.as_ref().and_then(correlation_id),
            outcome,
        })
    }
}

fn decode_outcome(object: &mut Map<String, Value>) -> Result<Result<Value, RpcErrorObject>, ProtocolError> {
    if let Some(error) = object.remove("error") {
        let decoded = serde_json::from_value::<RpcErrorObject>(error)
            .map_err(|err| ProtocolError::InvalidEnvelope(format!("malformed error object: {err}")))?;
        return Ok(Err(decoded));
    }
    object.remove("result").map(Ok).ok_or_else(|| {
        ProtocolError::InvalidEnvelope("message has neither method, result nor error".to_owned())
    })
}

fn correlation_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

/// Builds a request envelope.
#[must_use]
pub fn request(id: u64, method: &str, params: Option<Value>) -> Value {
    let mut envelope = json!({"jsonrpc": JSONRPC_VERSION, "id": id, "method": method});
    if let (Some(payload), Some(object)) = (params, envelope.as_object_mut()) {
        object.insert("params".to_owned(), payload);
    }
    envelope
}

/// Builds a notification envelope.
#[must_use]
pub fn notification(method: &str, params: Option<Value>) -> Value {
    let mut envelope = json!({"jsonrpc": JSONRPC_VERSION, "method": method});
    if let (Some(payload), Some(object)) = (params, envelope.as_object_mut()) {
        object.insert("params".to_owned(), payload);
    }
    envelope
}

/// Builds a success reply to a server-initiated request.
#[must_use]
pub fn result_response(id: Value, result: Value) -> Value {
    json!({"jsonrpc": JSONRPC_VERSION, "id": id, "result": result})
}

/// Builds an error reply to a server-initiated request.
#[must_use]
pub fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {"code": code, "message": message}
    })
}
