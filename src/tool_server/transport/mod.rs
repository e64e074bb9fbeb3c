//! Transport capability set shared by every tool server channel.
//!
//! A [`TransportConnector`] turns a [`ServerConfig`] into a [`Connection`]:
//! a [`FrameSink`] for outbound JSON-RPC frames plus a stream of inbound
//! frames. Sessions hold only these two halves, so nothing above this module
//! branches on transport kind.

mod connector;
mod error;
mod event_stream;
mod framing;
mod process;
mod socket;

pub use connector::DefaultTransportConnector;
pub use error::{ConnectError, InboundError, ProtocolError, TransportError};
pub use framing::DiagnosticTail;

use crate::tool_server::domain::ServerConfig;
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One item received from a transport.
///
/// A [`InboundError::Transport`] item is always the last item of a stream.
pub type InboundItem = Result<Value, InboundError>;

/// Stream of inbound frames for one connection.
pub type InboundStream = BoxStream<'static, InboundItem>;

/// Outbound half of an open connection.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Sends one frame. Frames sent on one sink reach the peer in call order.
    async fn send(&self, frame: Value) -> Result<(), TransportError>;

    /// Tears the connection down. Idempotent.
    async fn close(&self);

    /// Returns recent out-of-band diagnostic lines, oldest first.
    fn diagnostics(&self) -> Vec<String> {
        Vec::new()
    }
}

/// An open connection to one tool server.
pub struct Connection {
    /// Outbound half.
    pub sink: Arc<dyn FrameSink>,
    /// Inbound half.
    pub inbound: InboundStream,
}

impl Connection {
    /// Assembles a connection from its halves.
    #[must_use]
    pub fn new(sink: Arc<dyn FrameSink>, inbound: InboundStream) -> Self {
        Self { sink, inbound }
    }

    /// Assembles a connection whose inbound half is fed by a channel.
    #[must_use]
    pub fn from_channel(sink: Arc<dyn FrameSink>, receiver: mpsc::Receiver<InboundItem>) -> Self {
        Self::new(sink, ReceiverStream::new(receiver).boxed())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens connections to tool servers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Establishes a connection described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when the target cannot be reached.
    async fn open(&self, config: &ServerConfig) -> Result<Connection, ConnectError>;
}
