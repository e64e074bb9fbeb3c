//! HTTP event-stream transport: inbound server-sent events, outbound POSTs.
//!
//! The server's first `endpoint` event names the URL that accepts outbound
//! messages; it is resolved relative to the stream URL.

use super::{Connection, ConnectError, FrameSink, InboundItem, ProtocolError, TransportError};
use crate::tool_server::domain::{EventStreamTransportConfig, ServerId};
use crate::tool_server::settings::ManagerSettings;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest_eventsource::{Error as EventSourceError, Event, EventSource, retry::Never};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

const INBOUND_BUFFER: usize = 64;
const ENDPOINT_EVENT: &str = "endpoint";
const MESSAGE_EVENT: &str = "message";

/// Opens the event stream and waits for the message endpoint.
pub(super) async fn open(
    server_id: ServerId,
    client: &reqwest::Client,
    config: &EventStreamTransportConfig,
    settings: &ManagerSettings,
) -> Result<Connection, ConnectError> {
    let stream_url = config.url();
    let unreachable = |reason: String| ConnectError::Unreachable {
        endpoint: stream_url.to_owned(),
        reason,
    };
    let base = Url::parse(stream_url).map_err(|err| unreachable(err.to_string()))?;

    let request = with_headers(
        client.get(base.clone()).header(ACCEPT, "text/event-stream"),
        config.headers(),
    );
    let mut events = EventSource::new(request).map_err(|err| unreachable(err.to_string()))?;
    events.set_retry_policy(Box::new(Never));

    let post_url = loop {
        match events.next().await {
            Some(Ok(Event::Open)) => debug!(server_id = %server_id, "event stream opened"),
            Some(Ok(Event::Message(message))) if message.event == ENDPOINT_EVENT => {
                let resolved = base
                    .join(message.data.trim())
                    .map_err(|err| unreachable(format!("invalid endpoint event: {err}")))?;
                break resolved;
            }
            Some(Ok(Event::Message(message))) => {
                debug!(
                    server_id = %server_id,
                    event = %message.event,
                    "ignoring event received before endpoint"
                );
            }
            Some(Err(EventSourceError::InvalidStatusCode(status, _))) => {
                events.close();
                return Err(ConnectError::Rejected {
                    endpoint: stream_url.to_owned(),
                    status: status.as_u16(),
                });
            }
            Some(Err(err)) => {
                events.close();
                return Err(unreachable(err.to_string()));
            }
            None => return Err(unreachable("stream ended before endpoint event".to_owned())),
        }
    };
    info!(server_id = %server_id, endpoint = %post_url, "event stream connected");

    let (sender, receiver) = mpsc::channel(INBOUND_BUFFER);
    let pump = tokio::spawn(pump_events(
        server_id,
        events,
        sender,
        settings.max_frame_bytes,
    ));
    let sink = EventStreamSink {
        client: client.clone(),
        post_url,
        headers: config.headers().clone(),
        post_timeout: settings.request_timeout(),
        pump: Mutex::new(Some(pump)),
    };
    Ok(Connection::from_channel(Arc::new(sink), receiver))
}

fn with_headers(
    mut request: reqwest::RequestBuilder,
    headers: &BTreeMap<String, String>,
) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

fn decode_event(data: &str, max_frame_bytes: usize) -> InboundItem {
    if data.len() > max_frame_bytes {
        return Err(ProtocolError::FrameTooLarge {
            size: data.len(),
            limit: max_frame_bytes,
        }
        .into());
    }
    serde_json::from_str(data).map_err(|err| ProtocolError::InvalidJson(err.to_string()).into())
}

async fn pump_events(
    server_id: ServerId,
    mut events: EventSource,
    sender: mpsc::Sender<InboundItem>,
    max_frame_bytes: usize,
) {
    let failure = loop {
        let item = match events.next().await {
            Some(Ok(Event::Open)) => continue,
            Some(Ok(Event::Message(message))) => {
                if message.event != MESSAGE_EVENT && !message.event.is_empty() {
                    debug!(server_id = %server_id, event = %message.event, "ignoring event");
                    continue;
                }
                decode_event(&message.data, max_frame_bytes)
            }
            Some(Err(EventSourceError::StreamEnded)) | None => break TransportError::Closed,
            Some(Err(err)) => break TransportError::Io(err.to_string()),
        };
        if sender.send(item).await.is_err() {
            events.close();
            return;
        }
    };
    events.close();
    debug!(server_id = %server_id, error = %failure, "event stream ended");
    if sender.send(Err(failure.into())).await.is_err() {
        debug!(server_id = %server_id, "session dropped before stream end was reported");
    }
}

struct EventStreamSink {
    client: reqwest::Client,
    post_url: Url,
    headers: BTreeMap<String, String>,
    // Bounds each POST; the stream itself stays open without a deadline.
    post_timeout: Duration,
    pump: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl FrameSink for EventStreamSink {
    async fn send(&self, frame: Value) -> Result<(), TransportError> {
        if self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
        {
            return Err(TransportError::AlreadyClosed);
        }
        let request = with_headers(self.client.post(self.post_url.clone()), &self.headers);
        let response = request
            .timeout(self.post_timeout)
            .json(&frame)
            .send()
            .await
            .map_err(|err| TransportError::Io(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Rejected {
                status: status.as_u16(),
            })
        }
    }

    async fn close(&self) {
        let pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = pump {
            handle.abort();
        }
    }
}

impl Drop for EventStreamSink {
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
