//! Per-connection receive loop.

use super::correlator::RequestCorrelator;
use crate::tool_server::domain::ServerId;
use crate::tool_server::protocol::{
    Inbound, LogMessage, METHOD_NOT_FOUND, ServerNotification, error_response, methods,
    result_response,
};
use crate::tool_server::transport::{FrameSink, InboundError, InboundStream};
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Session callbacks invoked by the receive loop.
///
/// Implementations must ignore events whose generation is not the live one.
pub(super) trait LinkObserver: Send + Sync {
    /// The connection failed; pending requests have already been failed.
    fn link_failed(&self, generation: u64, reason: String);

    /// The server announced that its tool catalog changed.
    fn catalog_changed(&self, generation: u64);
}

pub(super) struct ReceiveLoop {
    pub(super) server_id: ServerId,
    pub(super) generation: u64,
    pub(super) sink: Arc<dyn FrameSink>,
    pub(super) correlator: RequestCorrelator,
    pub(super) observer: Weak<dyn LinkObserver>,
    pub(super) sweep_interval: Duration,
}

impl ReceiveLoop {
    /// Drives `inbound` until the transport fails or ends.
    pub(super) async fn run(self, mut inbound: InboundStream) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                item = inbound.next() => match item {
                    Some(Ok(frame)) => self.dispatch(frame).await,
                    Some(Err(InboundError::Protocol(err))) => {
                        warn!(server_id = %self.server_id, error = %err, "skipping malformed frame");
                    }
                    Some(Err(InboundError::Transport(err))) => break err.to_string(),
                    None => break "transport stream ended".to_owned(),
                },
                _ = sweep.tick() => {
                    let expired = self.correlator.sweep_expired();
                    if expired > 0 {
                        debug!(server_id = %self.server_id, expired, "swept expired requests");
                    }
                }
            }
        };

        let failed = self.correlator.fail_all(&reason);
        debug!(
            server_id = %self.server_id,
            failed_requests = failed,
            "receive loop finished"
        );
        if let Some(observer) = self.observer.upgrade() {
            observer.link_failed(self.generation, reason);
        }
        self.sink.close().await;
    }

    async fn dispatch(&self, frame: Value) {
        let inbound = match Inbound::classify(frame) {
            Ok(inbound) => inbound,
            Err(err) => {
                warn!(server_id = %self.server_id, error = %err, "skipping unrecognised message");
                return;
            }
        };
        match inbound {
            Inbound::Response { id: Some(id), outcome } => {
                if !self.correlator.complete(id, outcome) {
                    warn!(
                        server_id = %self.server_id,
                        correlation_id = id,
                        "discarding late or unsolicited response"
                    );
                }
            }
            Inbound::Response { id: None, .. } => {
                warn!(server_id = %self.server_id, "discarding response without a usable id");
            }
            Inbound::Request { id, method, .. } => self.answer(id, &method).await,
            Inbound::Notification { method, params } => self.notify(&method, params),
        }
    }

    async fn answer(&self, id: Value, method: &str) {
        let reply = if method == methods::PING {
            result_response(id, json!({}))
        } else {
            debug!(server_id = %self.server_id, method, "rejecting unsupported server request");
            error_response(id, METHOD_NOT_FOUND, "method not supported by client")
        };
        if let Err(err) = self.sink.send(reply).await {
            debug!(server_id = %self.server_id, error = %err, "failed to answer server request");
        }
    }

    fn notify(&self, method: &str, params: Option<Value>) {
        match ServerNotification::from_parts(method, params) {
            ServerNotification::ToolsListChanged => {
                info!(server_id = %self.server_id, "tool server announced a catalog change");
                if let Some(observer) = self.observer.upgrade() {
                    observer.catalog_changed(self.generation);
                }
            }
            ServerNotification::Log(message) => log_server_message(self.server_id, &message),
            ServerNotification::Other(name) => {
                debug!(server_id = %self.server_id, method = %name, "ignoring notification");
            }
        }
    }
}

fn log_server_message(server_id: ServerId, message: &LogMessage) {
    let logger = message.logger.as_deref().unwrap_or("server");
    let data = &message.data;
    match message.level.as_str() {
        "debug" => debug!(server_id = %server_id, logger, %data, "tool server log"),
        "info" | "notice" => info!(server_id = %server_id, logger, %data, "tool server log"),
        "warning" => warn!(server_id = %server_id, logger, %data, "tool server log"),
        "error" | "critical" | "alert" | "emergency" => {
            error!(server_id = %server_id, logger, %data, "tool server log");
        }
        _ => debug!(server_id = %server_id, logger, level = %message.level, %data, "tool server log"),
    }
}
