//! Persistent socket transport using the same line framing as processes.

use super::framing::{LineWriter, PumpEnd, pump_lines};
use super::{Connection, ConnectError, FrameSink, InboundItem, TransportError};
use crate::tool_server::domain::{ServerId, SocketTransportConfig};
use crate::tool_server::settings::ManagerSettings;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const INBOUND_BUFFER: usize = 64;

/// Parsed socket address.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SocketTarget {
    Tcp(String),
    Unix(String),
}

impl SocketTarget {
    fn parse(endpoint: &str) -> Result<Self, ConnectError> {
        if let Some(address) = endpoint.strip_prefix("tcp://") {
            return Ok(Self::Tcp(address.trim_end_matches('/').to_owned()));
        }
        if let Some(path) = endpoint.strip_prefix("unix://") {
            return Ok(Self::Unix(path.to_owned()));
        }
        Err(ConnectError::UnsupportedEndpoint(endpoint.to_owned()))
    }
}

/// Connects to the configured socket endpoint.
pub(super) async fn open(
    server_id: ServerId,
    config: &SocketTransportConfig,
    settings: &ManagerSettings,
) -> Result<Connection, ConnectError> {
    let endpoint = config.endpoint();
    let unreachable = |reason: String| ConnectError::Unreachable {
        endpoint: endpoint.to_owned(),
        reason,
    };
    if !config.headers().is_empty() {
        debug!(server_id = %server_id, "socket transport ignores configured headers");
    }

    match SocketTarget::parse(endpoint)? {
        SocketTarget::Tcp(address) => {
            let stream = TcpStream::connect(address.as_str())
                .await
                .map_err(|err| unreachable(err.to_string()))?;
            if let Err(err) = stream.set_nodelay(true) {
                debug!(server_id = %server_id, error = %err, "failed to disable Nagle");
            }
            let (reader, writer) = stream.into_split();
            info!(server_id = %server_id, endpoint, "connected to tool server socket");
            Ok(wire(server_id, reader, writer, settings.max_frame_bytes))
        }
        #[cfg(unix)]
        SocketTarget::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(&path)
                .await
                .map_err(|err| unreachable(err.to_string()))?;
            let (reader, writer) = stream.into_split();
            info!(server_id = %server_id, endpoint, "connected to tool server socket");
            Ok(wire(server_id, reader, writer, settings.max_frame_bytes))
        }
        #[cfg(not(unix))]
        SocketTarget::Unix(_) => Err(ConnectError::UnsupportedEndpoint(endpoint.to_owned())),
    }
}

fn wire<R, W>(server_id: ServerId, reader: R, writer: W, max_frame_bytes: usize) -> Connection
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    let (sender, receiver) = mpsc::channel(INBOUND_BUFFER);
    let pump = tokio::spawn(read_socket(server_id, reader, sender, max_frame_bytes));
    let sink = SocketSink {
        writer: LineWriter::new(writer),
        pump: Mutex::new(Some(pump)),
    };
    Connection::from_channel(Arc::new(sink), receiver)
}

async fn read_socket<R>(
    server_id: ServerId,
    reader: R,
    sender: mpsc::Sender<InboundItem>,
    max_frame_bytes: usize,
) where
    R: AsyncRead + Unpin,
{
    let failure = match pump_lines(reader, max_frame_bytes, &sender).await {
        PumpEnd::ReceiverGone => return,
        PumpEnd::Eof => TransportError::Closed,
        PumpEnd::Failed(err) => err,
    };
    debug!(server_id = %server_id, error = %failure, "tool server socket ended");
    if sender.send(Err(failure.into())).await.is_err() {
        debug!(server_id = %server_id, "session dropped before socket closure was reported");
    }
}

struct SocketSink<W> {
    writer: LineWriter<W>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl<W> FrameSink for SocketSink<W>
where
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    async fn send(&self, frame: Value) -> Result<(), TransportError> {
        self.writer.write_frame(&frame).await
    }

    async fn close(&self) {
        self.writer.shutdown().await;
        let pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = pump {
            handle.abort();
        }
    }
}

impl<W> Drop for SocketSink<W> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .pump
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
