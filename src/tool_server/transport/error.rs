//! Error taxonomy shared by all transports.

pub use crate::tool_server::protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// A connection could not be established.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The process could not be started.
    #[error("failed to spawn '{command}': {reason}")]
    Spawn {
        /// Configured command.
        command: String,
        /// Operating system detail.
        reason: String,
    },

    /// The endpoint could not be reached.
    #[error("failed to reach {endpoint}: {reason}")]
    Unreachable {
        /// Configured endpoint.
        endpoint: String,
        /// Network detail.
        reason: String,
    },

    /// The endpoint answered with a non-success HTTP status.
    #[error("{endpoint} rejected the connection with HTTP {status}")]
    Rejected {
        /// Configured endpoint.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// The endpoint is syntactically valid but cannot be used here.
    #[error("unsupported endpoint '{0}'")]
    UnsupportedEndpoint(String),

    /// Opening and handshaking did not finish in time.
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The transport opened but the protocol handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The attempt was abandoned because the server was stopped.
    #[error("connection attempt cancelled")]
    Cancelled,
}

/// An established connection failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The child process exited.
    #[error("process exited ({status})")]
    ProcessExited {
        /// Rendered exit status.
        status: String,
    },

    /// The peer closed the channel.
    #[error("connection closed by peer")]
    Closed,

    /// The connection has been closed locally.
    #[error("connection already closed")]
    AlreadyClosed,

    /// An outbound HTTP request was rejected.
    #[error("message endpoint returned HTTP {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },

    /// An I/O or network failure.
    #[error("transport I/O failure: {0}")]
    Io(String),
}

/// Failure observed on the inbound half of a connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InboundError {
    /// The connection failed; no further items follow.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A malformed frame was received; the connection stays usable.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
