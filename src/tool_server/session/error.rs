//! Error types for session control and tool invocation.

use super::CorrelationError;
use crate::tool_server::domain::{InvocationFailureKind, SessionState};
use crate::tool_server::protocol::{ProtocolError, RpcErrorObject};
use crate::tool_server::transport::{ConnectError, TransportError};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A failure reported by the tool server itself, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// JSON-RPC error code; absent when the tool reported `isError`.
    pub code: Option<i64>,
    /// Server-reported message.
    pub message: String,
    /// Server-reported payload.
    pub data: Option<Value>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(formatter, "remote error {code}: {}", self.message),
            None => write!(formatter, "tool reported an error: {}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<RpcErrorObject> for RemoteError {
    fn from(value: RpcErrorObject) -> Self {
        Self {
            code: Some(value.code),
            message: value.message,
            data: value.data,
        }
    }
}

/// Typed failure of a tool invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvocationError {
    /// The session is not connected.
    #[error("server is not connected (state: {0})")]
    NotConnected(SessionState),

    /// The tool is not in the current catalog.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// No reply arrived before the deadline.
    #[error("tool call timed out after {0:?}")]
    Timeout(Duration),

    /// The connection was torn down while the call was pending.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The tool reported a failure.
    #[error(transparent)]
    Remote(RemoteError),

    /// Too many calls were already outstanding on the connection.
    #[error("too many pending requests (limit {0})")]
    Saturated(usize),
}

impl InvocationError {
    /// Returns the audit category for this failure.
    #[must_use]
    pub const fn failure_kind(&self) -> InvocationFailureKind {
        match self {
            Self::NotConnected(_) => InvocationFailureKind::NotConnected,
            Self::UnknownTool(_) => InvocationFailureKind::UnknownTool,
            Self::Timeout(_) => InvocationFailureKind::Timeout,
            Self::ConnectionLost(_) => InvocationFailureKind::ConnectionLost,
            Self::Remote(_) => InvocationFailureKind::RemoteError,
            Self::Saturated(_) => InvocationFailureKind::Saturated,
        }
    }
}

impl From<CorrelationError> for InvocationError {
    fn from(value: CorrelationError) -> Self {
        match value {
            CorrelationError::Timeout(elapsed) => Self::Timeout(elapsed),
            CorrelationError::ConnectionLost(reason) => Self::ConnectionLost(reason),
            CorrelationError::Saturated(limit) => Self::Saturated(limit),
        }
    }
}

/// Errors returned by session control operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The server's configuration is disabled.
    #[error("server is disabled")]
    Disabled,

    /// The operation needs a connected session.
    #[error("server is not connected (state: {0})")]
    NotConnected(SessionState),

    /// The connection could not be established.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The connection failed while a request was outstanding.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server sent a malformed reply.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A request did not receive a reply.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// The server answered with an error.
    #[error(transparent)]
    Remote(RemoteError),
}

/// Internal outcome of one correlated request.
#[derive(Debug)]
pub(super) enum RequestFailure {
    Send(TransportError),
    Correlation(CorrelationError),
    Remote(RemoteError),
}

impl From<CorrelationError> for RequestFailure {
    fn from(value: CorrelationError) -> Self {
        Self::Correlation(value)
    }
}

impl From<RequestFailure> for SessionError {
    fn from(value: RequestFailure) -> Self {
        match value {
            RequestFailure::Send(err) => Self::Transport(err),
            RequestFailure::Correlation(err) => Self::Correlation(err),
            RequestFailure::Remote(err) => Self::Remote(err),
        }
    }
}

impl From<RequestFailure> for InvocationError {
    fn from(value: RequestFailure) -> Self {
        match value {
            RequestFailure::Send(err) => Self::ConnectionLost(err.to_string()),
            RequestFailure::Correlation(err) => err.into(),
            RequestFailure::Remote(err) => Self::Remote(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CorrelationError::Timeout(Duration::from_millis(5)), InvocationFailureKind::Timeout)]
    #[case(CorrelationError::ConnectionLost("x".to_owned()), InvocationFailureKind::ConnectionLost)]
    #[case(CorrelationError::Saturated(4), InvocationFailureKind::Saturated)]
    fn correlation_failures_map_to_audit_kinds(
        #[case] error: CorrelationError,
        #[case] expected: InvocationFailureKind,
    ) {
        assert_eq!(InvocationError::from(error).failure_kind(), expected);
    }

    #[test]
    fn send_failure_is_reported_as_connection_lost() {
        let error = InvocationError::from(RequestFailure::Send(TransportError::Closed));
        assert!(matches!(error, InvocationError::ConnectionLost(_)));
    }

    #[test]
    fn rpc_error_keeps_code_and_data() {
        let remote = RemoteError::from(RpcErrorObject {
            code: -32_602,
            message: "invalid params".to_owned(),
            data: Some(serde_json::json!({"field": "path"})),
        });
        assert_eq!(remote.code, Some(-32_602));
        assert_eq!(remote.to_string(), "remote error -32602: invalid params");
    }
}
