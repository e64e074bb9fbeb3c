//! Append-only audit records for tool invocations.

use super::{InvocationId, ParseFailureKindError, ServerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// SHA-256 digest of the canonical JSON encoding of invocation arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentDigest(String);

impl ArgumentDigest {
    /// Computes the digest of `arguments`.
    #[must_use]
    pub fn of(arguments: &Value) -> Self {
        // `Value` serialization cannot fail; objects serialize in key order.
        let canonical = arguments.to_string();
        let hash = Sha256::digest(canonical.as_bytes());
        Self(format!("{hash:x}"))
    }

    /// Wraps a digest read back from storage.
    #[must_use]
    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the lowercase hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArgumentDigest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Category of a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationFailureKind {
    /// The session was not connected.
    NotConnected,
    /// The tool is not in the current catalog.
    UnknownTool,
    /// The per-call deadline expired.
    Timeout,
    /// The connection was torn down while the call was pending.
    ConnectionLost,
    /// The tool reported a failure.
    RemoteError,
    /// Too many requests were already outstanding.
    Saturated,
}

impl InvocationFailureKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::UnknownTool => "unknown_tool",
            Self::Timeout => "timeout",
            Self::ConnectionLost => "connection_lost",
            Self::RemoteError => "remote_error",
            Self::Saturated => "saturated",
        }
    }
}

impl fmt::Display for InvocationFailureKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for InvocationFailureKind {
    type Error = ParseFailureKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "not_connected" => Ok(Self::NotConnected),
            "unknown_tool" => Ok(Self::UnknownTool),
            "timeout" => Ok(Self::Timeout),
            "connection_lost" => Ok(Self::ConnectionLost),
            "remote_error" => Ok(Self::RemoteError),
            "saturated" => Ok(Self::Saturated),
            _ => Err(ParseFailureKindError(value.to_owned())),
        }
    }
}

/// Failure detail attached to an unsuccessful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationFailure {
    /// Failure category.
    pub kind: InvocationFailureKind,
    /// Human-readable summary.
    pub summary: String,
}

/// Parameter object for building an [`InvocationRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRecordData {
    /// Target server.
    pub server_id: ServerId,
    /// Requested tool name.
    pub tool_name: String,
    /// Digest of the call arguments.
    pub argument_digest: ArgumentDigest,
    /// Truncated rendering of the arguments.
    pub arguments_preview: String,
    /// Truncated rendering of the result, when the call succeeded.
    pub result_preview: Option<String>,
    /// Failure detail, when the call failed.
    pub failure: Option<InvocationFailure>,
    /// Wall-clock time between dispatch and outcome.
    pub duration: Duration,
    /// When the call was dispatched.
    pub started_at: DateTime<Utc>,
}

/// Write-once audit entry for one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    id: InvocationId,
    server_id: ServerId,
    tool_name: String,
    argument_digest: ArgumentDigest,
    arguments_preview: String,
    result_preview: Option<String>,
    failure: Option<InvocationFailure>,
    duration: Duration,
    started_at: DateTime<Utc>,
}

impl InvocationRecord {
    /// Creates a record with a fresh identifier.
    #[must_use]
    pub fn new(data: InvocationRecordData) -> Self {
        Self::with_id(InvocationId::new(), data)
    }

    /// Creates a record with an explicit identifier, as read from storage.
    #[must_use]
    pub fn with_id(id: InvocationId, data: InvocationRecordData) -> Self {
        Self {
            id,
            server_id: data.server_id,
            tool_name: data.tool_name,
            argument_digest: data.argument_digest,
            arguments_preview: data.arguments_preview,
            result_preview: data.result_preview,
            failure: data.failure,
            duration: data.duration,
            started_at: data.started_at,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> InvocationId {
        self.id
    }

    /// Returns the target server.
    #[must_use]
    pub const fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Returns the requested tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the argument digest.
    #[must_use]
    pub const fn argument_digest(&self) -> &ArgumentDigest {
        &self.argument_digest
    }

    /// Returns the truncated argument rendering.
    #[must_use]
    pub fn arguments_preview(&self) -> &str {
        &self.arguments_preview
    }

    /// Returns the truncated result rendering.
    #[must_use]
    pub fn result_preview(&self) -> Option<&str> {
        self.result_preview.as_deref()
    }

    /// Returns whether the call succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// Returns the failure detail, if the call failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&InvocationFailure> {
        self.failure.as_ref()
    }

    /// Returns the call duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns when the call was dispatched.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Truncates `text` to at most `max_chars` characters, appending an ellipsis
/// when anything was cut.
#[must_use]
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_owned(),
        Some((cut, _)) => {
            let mut preview = text.get(..cut).unwrap_or(text).to_owned();
            preview.push('…');
            preview
        }
    }
}
