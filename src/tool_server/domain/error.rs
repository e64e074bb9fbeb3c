//! Error types for tool server domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing tool server domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolServerDomainError {
    /// The server name is empty after trimming.
    #[error("tool server name must not be empty")]
    EmptyServerName,

    /// The server name contains control characters.
    #[error("tool server name '{0}' contains control characters")]
    InvalidServerName(String),

    /// The server name exceeds the 100-character storage limit.
    #[error("tool server name exceeds 100 character limit: {0}")]
    ServerNameTooLong(String),

    /// The catalog template identifier is empty after trimming.
    #[error("catalog template id must not be empty")]
    EmptyTemplateId,

    /// The catalog template identifier contains characters outside
    /// `[a-z0-9_-]`.
    #[error(
        "catalog template id '{0}' contains invalid characters (only lowercase alphanumeric, '-' and '_' allowed)"
    )]
    InvalidTemplateId(String),

    /// The process command is empty.
    #[error("process command must not be empty")]
    EmptyProcessCommand,

    /// The process working directory is empty after trimming.
    #[error("process working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// The event-stream URL is empty.
    #[error("event-stream URL must not be empty")]
    EmptyEventStreamUrl,

    /// The event-stream URL does not have an `http://` or `https://` prefix.
    #[error("event-stream URL '{0}' must start with 'http://' or 'https://'")]
    InvalidEventStreamUrl(String),

    /// The socket endpoint is empty.
    #[error("socket endpoint must not be empty")]
    EmptySocketEndpoint,

    /// The socket endpoint does not use a supported scheme.
    #[error("socket endpoint '{0}' must start with 'tcp://' or 'unix://'")]
    InvalidSocketEndpoint(String),

    /// A tool schema name is empty after trimming.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// Two tools in one catalog share a name.
    #[error("duplicate tool name in catalog: {0}")]
    DuplicateToolName(String),

    /// Transitioning between two session states is invalid.
    #[error("invalid session state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// Current session state.
        from: String,
        /// Requested target session state.
        to: String,
    },
}

/// Error returned while parsing a session state from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown session state: {0}")]
pub struct ParseSessionStateError(pub String);

/// Error returned while parsing a transport kind from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown transport kind: {0}")]
pub struct ParseTransportKindError(pub String);

/// Error returned while parsing an invocation failure kind from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown invocation failure kind: {0}")]
pub struct ParseFailureKindError(pub String);
