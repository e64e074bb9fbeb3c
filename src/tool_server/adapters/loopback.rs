//! In-process scripted tool server for deterministic flows and tests.
//!
//! [`LoopbackConnector`] answers the handshake, discovery, and tool calls
//! without any I/O, and counts every connection and tool call it sees.

use crate::tool_server::{
    domain::{ServerConfig, ToolSchema},
    protocol::{
        Inbound, METHOD_NOT_FOUND, PROTOCOL_VERSION, error_response, methods, notification,
        result_response,
    },
    transport::{
        Connection, ConnectError, FrameSink, InboundItem, TransportConnector, TransportError,
    },
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 256;

/// How the loopback server answers `tools/call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopbackCallMode {
    /// Replies with the arguments; an integer `delay_ms` argument delays the
    /// reply.
    Echo,
    /// Never replies.
    Silent,
    /// Replies with a JSON-RPC error.
    RpcError {
        /// Error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// Replies with an `isError` result carrying `message`.
    ToolError(String),
}

/// Script for the loopback server.
#[derive(Debug, Clone)]
pub struct LoopbackServer {
    tools: Vec<ToolSchema>,
    page_size: Option<usize>,
    call_mode: LoopbackCallMode,
    reject_handshake: bool,
    fail_discovery: bool,
}

impl LoopbackServer {
    /// Creates a server exposing `tools` and echoing calls.
    #[must_use]
    pub const fn new(tools: Vec<ToolSchema>) -> Self {
        Self {
            tools,
            page_size: None,
            call_mode: LoopbackCallMode::Echo,
            reject_handshake: false,
            fail_discovery: false,
        }
    }

    /// Splits `tools/list` results into pages of `size` tools.
    #[must_use]
    pub const fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Sets the call behaviour.
    #[must_use]
    pub fn with_call_mode(mut self, mode: LoopbackCallMode) -> Self {
        self.call_mode = mode;
        self
    }

    /// Makes `initialize` fail.
    #[must_use]
    pub const fn rejecting_handshake(mut self) -> Self {
        self.reject_handshake = true;
        self
    }

    /// Makes `tools/list` fail.
    #[must_use]
    pub const fn failing_discovery(mut self) -> Self {
        self.fail_discovery = true;
        self
    }

    fn tools_page(&self, cursor: Option<&str>) -> Value {
        let start = cursor.and_then(|value| value.parse::<usize>().ok()).unwrap_or(0);
        let size = self.page_size.unwrap_or(usize::MAX).max(1);
        let page: Vec<Value> = self
            .tools
            .iter()
            .skip(start)
            .take(size)
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect();
        let next = start.saturating_add(page.len());
        if next < self.tools.len() {
            json!({"tools": page, "nextCursor": next.to_string()})
        } else {
            json!({"tools": page})
        }
    }
}

#[derive(Debug, Default)]
struct LoopbackStats {
    opens: AtomicUsize,
    tool_calls: AtomicUsize,
}

/// Connector whose connections are served in-process by a [`LoopbackServer`].
#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    server: Arc<RwLock<LoopbackServer>>,
    stats: Arc<LoopbackStats>,
    open_failure: Arc<Mutex<Option<ConnectError>>>,
    live: Arc<Mutex<Vec<mpsc::Sender<InboundItem>>>>,
}

impl LoopbackConnector {
    /// Creates a connector for `server`.
    #[must_use]
    pub fn new(server: LoopbackServer) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            stats: Arc::default(),
            open_failure: Arc::default(),
            live: Arc::default(),
        }
    }

    /// Returns how many connections were opened.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.stats.opens.load(Ordering::SeqCst)
    }

    /// Returns how many `tools/call` requests reached the server.
    #[must_use]
    pub fn tool_calls(&self) -> usize {
        self.stats.tool_calls.load(Ordering::SeqCst)
    }

    /// Makes subsequent opens fail with `error`, or succeed again with `None`.
    pub fn fail_opens_with(&self, error: Option<ConnectError>) {
        *self
            .open_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Replaces the server script for subsequent requests.
    pub fn set_server(&self, server: LoopbackServer) {
        *self.server.write().unwrap_or_else(PoisonError::into_inner) = server;
    }

    /// Breaks every open connection as if the peer vanished.
    pub async fn sever(&self) {
        for sender in self.take_live() {
            if sender.send(Err(TransportError::Closed.into())).await.is_err() {
                tracing::debug!("loopback connection already gone");
            }
        }
    }

    /// Sends `notifications/tools/list_changed` on every open connection.
    pub async fn announce_tools_changed(&self) {
        let senders = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for sender in senders {
            let frame = notification(methods::TOOLS_LIST_CHANGED, None);
            if sender.send(Ok(frame)).await.is_err() {
                tracing::debug!("loopback connection already gone");
            }
        }
    }

    fn take_live(&self) -> Vec<mpsc::Sender<InboundItem>> {
        std::mem::take(&mut *self.live.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl TransportConnector for LoopbackConnector {
    async fn open(&self, _config: &ServerConfig) -> Result<Connection, ConnectError> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .open_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            live.retain(|open| !open.is_closed());
            live.push(sender.clone());
        }
        let sink = LoopbackSink {
            server: Arc::clone(&self.server),
            stats: Arc::clone(&self.stats),
            sender: Mutex::new(Some(sender)),
        };
        Ok(Connection::from_channel(Arc::new(sink), receiver))
    }
}

struct LoopbackSink {
    server: Arc<RwLock<LoopbackServer>>,
    stats: Arc<LoopbackStats>,
    sender: Mutex<Option<mpsc::Sender<InboundItem>>>,
}

impl LoopbackSink {
    fn reply(&self, frame: Value) -> Option<(Value, Option<Duration>)> {
        let Ok(Inbound::Request { id, method, params }) = Inbound::classify(frame) else {
            return None;
        };
        let server = self
            .server
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let payload = params.unwrap_or(Value::Null);

        let reply = match method.as_str() {
            methods::INITIALIZE if server.reject_handshake => {
                error_response(id, -32_603, "handshake rejected")
            }
            methods::INITIALIZE => result_response(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": {"name": "loopback"},
                    "capabilities": {"tools": {"listChanged": true}}
                }),
            ),
            methods::TOOLS_LIST if server.fail_discovery => {
                error_response(id, -32_603, "discovery unavailable")
            }
            methods::TOOLS_LIST => {
                let cursor = payload.get("cursor").and_then(Value::as_str);
                result_response(id, server.tools_page(cursor))
            }
            methods::TOOLS_CALL => {
                self.stats.tool_calls.fetch_add(1, Ordering::SeqCst);
                return call_reply(&server.call_mode, id, &payload);
            }
            methods::PING => result_response(id, json!({})),
            _ => error_response(id, METHOD_NOT_FOUND, "method not supported"),
        };
        Some((reply, None))
    }

    fn sender(&self) -> Result<mpsc::Sender<InboundItem>, TransportError> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TransportError::AlreadyClosed)
    }
}

fn call_reply(mode: &LoopbackCallMode, id: Value, params: &Value) -> Option<(Value, Option<Duration>)> {
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
    match mode {
        LoopbackCallMode::Silent => None,
        LoopbackCallMode::Echo => {
            let delay = arguments
                .get("delay_ms")
                .and_then(Value::as_u64)
                .map(Duration::from_millis);
            let result = json!({
                "content": [{"type": "text", "text": arguments.to_string()}],
                "structuredContent": arguments,
            });
            Some((result_response(id, result), delay))
        }
        LoopbackCallMode::RpcError { code, message } => {
            Some((error_response(id, *code, message), None))
        }
        LoopbackCallMode::ToolError(message) => Some((
            result_response(
                id,
                json!({"content": [{"type": "text", "text": message}], "isError": true}),
            ),
            None,
        )),
    }
}

#[async_trait]
impl FrameSink for LoopbackSink {
    async fn send(&self, frame: Value) -> Result<(), TransportError> {
        let sender = self.sender()?;
        let Some((reply, delay)) = self.reply(frame) else {
            return Ok(());
        };
        match delay {
            None => sender
                .send(Ok(reply))
                .await
                .map_err(|_| TransportError::Closed),
            Some(wait) => {
                tokio::spawn(async move {
                    tokio::time::sleep(wait).await;
                    if sender.send(Ok(reply)).await.is_err() {
                        tracing::debug!("delayed loopback reply dropped");
                    }
                });
                Ok(())
            }
        }
    }

    async fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn diagnostics(&self) -> Vec<String> {
        vec!["loopback server ready".to_owned()]
    }
}
