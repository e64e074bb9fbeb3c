//! Tool server transport configuration value objects.

use super::{ParseTransportKindError, ToolServerDomainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Transport settings for a tool server spawned as a local process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTransportConfig {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    working_directory: Option<String>,
}

impl ProcessTransportConfig {
    /// Creates a new process transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::EmptyProcessCommand`] when `command`
    /// is empty after trimming.
    pub fn new(command: impl Into<String>) -> Result<Self, ToolServerDomainError> {
        let normalized_command = command.into().trim().to_owned();
        if normalized_command.is_empty() {
            return Err(ToolServerDomainError::EmptyProcessCommand);
        }

        Ok(Self {
            command: normalized_command,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
        })
    }

    /// Replaces command-line arguments.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.args = values.into_iter().collect();
        self
    }

    /// Replaces process environment variables.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Sets an explicit working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::EmptyWorkingDirectory`] when the
    /// provided value is empty after trimming.
    pub fn with_working_directory(
        mut self,
        value: impl Into<String>,
    ) -> Result<Self, ToolServerDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ToolServerDomainError::EmptyWorkingDirectory);
        }

        self.working_directory = Some(normalized);
        Ok(self)
    }

    /// Returns the executable command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns environment variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the optional working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }
}

/// Transport settings for a tool server reached over an HTTP event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStreamTransportConfig {
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

impl EventStreamTransportConfig {
    /// Creates a new event-stream transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError`] when `url` is empty or does not
    /// start with `http://` or `https://`.
    pub fn new(url: impl Into<String>) -> Result<Self, ToolServerDomainError> {
        let normalized_url = url.into().trim().to_owned();
        if normalized_url.is_empty() {
            return Err(ToolServerDomainError::EmptyEventStreamUrl);
        }

        let has_valid_prefix =
            normalized_url.starts_with("http://") || normalized_url.starts_with("https://");
        if !has_valid_prefix {
            return Err(ToolServerDomainError::InvalidEventStreamUrl(normalized_url));
        }

        Ok(Self {
            url: normalized_url,
            headers: BTreeMap::new(),
        })
    }

    /// Replaces the headers sent with the stream request and every POST.
    #[must_use]
    pub fn with_headers(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers = values.into_iter().collect();
        self
    }

    /// Returns the stream URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the configured request headers.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

/// Transport settings for a tool server reached over a persistent socket.
///
/// Endpoints use `tcp://host:port` or, on unix, `unix:///path/to/socket`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketTransportConfig {
    endpoint: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

impl SocketTransportConfig {
    /// Creates a new socket transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError`] when `endpoint` is empty or uses an
    /// unsupported scheme.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ToolServerDomainError> {
        let normalized = endpoint.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ToolServerDomainError::EmptySocketEndpoint);
        }

        if !(normalized.starts_with("tcp://") || normalized.starts_with("unix://")) {
            return Err(ToolServerDomainError::InvalidSocketEndpoint(normalized));
        }

        Ok(Self {
            endpoint: normalized,
            headers: BTreeMap::new(),
        })
    }

    /// Replaces connection headers.
    ///
    /// Raw sockets carry no header channel; the values are kept with the
    /// configuration so a reload can compare them.
    #[must_use]
    pub fn with_headers(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers = values.into_iter().collect();
        self
    }

    /// Returns the socket endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the configured headers.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

/// Transport kind of a tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Spawned local process using standard input/output.
    Process,
    /// HTTP event stream with a companion POST endpoint.
    EventStream,
    /// Persistent bidirectional socket.
    Socket,
}

impl TransportKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::EventStream => "event_stream",
            Self::Socket => "socket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TransportKind {
    type Error = ParseTransportKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "process" | "stdio" => Ok(Self::Process),
            "event_stream" | "sse" => Ok(Self::EventStream),
            "socket" => Ok(Self::Socket),
            _ => Err(ParseTransportKindError(value.to_owned())),
        }
    }
}

/// Supported tool server transport configuration variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum TransportConfig {
    /// Local process over standard input/output.
    Process(ProcessTransportConfig),
    /// HTTP event stream.
    EventStream(EventStreamTransportConfig),
    /// Persistent socket.
    Socket(SocketTransportConfig),
}

impl TransportConfig {
    /// Creates a `process` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`ProcessTransportConfig::new`].
    pub fn process(command: impl Into<String>) -> Result<Self, ToolServerDomainError> {
        Ok(Self::Process(ProcessTransportConfig::new(command)?))
    }

    /// Creates an `event_stream` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`EventStreamTransportConfig::new`].
    pub fn event_stream(url: impl Into<String>) -> Result<Self, ToolServerDomainError> {
        Ok(Self::EventStream(EventStreamTransportConfig::new(url)?))
    }

    /// Creates a `socket` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`SocketTransportConfig::new`].
    pub fn socket(endpoint: impl Into<String>) -> Result<Self, ToolServerDomainError> {
        Ok(Self::Socket(SocketTransportConfig::new(endpoint)?))
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::Process(_) => TransportKind::Process,
            Self::EventStream(_) => TransportKind::EventStream,
            Self::Socket(_) => TransportKind::Socket,
        }
    }
}
