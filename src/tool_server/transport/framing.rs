//! Newline-delimited JSON framing for byte-stream transports.

use super::{InboundItem, ProtocolError, TransportError};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::debug;

/// Longest a closing writer waits to flush frames the peer is not reading.
const CLOSE_FLUSH_LIMIT: Duration = Duration::from_secs(1);

/// Why a line pump stopped.
#[derive(Debug)]
pub(super) enum PumpEnd {
    /// The reader reached end of file.
    Eof,
    /// The reader failed.
    Failed(TransportError),
    /// The consumer dropped its receiver.
    ReceiverGone,
}

/// Decodes one line into a frame; blank lines yield `None`.
pub(super) fn decode_line(line: &str) -> Option<Result<Value, ProtocolError>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str(trimmed)
            .map_err(|err| ProtocolError::InvalidJson(err.to_string())),
    )
}

/// Reads newline-delimited JSON from `reader` into `sender`.
pub(super) async fn pump_lines<R>(
    reader: R,
    max_frame_bytes: usize,
    sender: &mpsc::Sender<InboundItem>,
) -> PumpEnd
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(max_frame_bytes));
    loop {
        let item = match lines.next().await {
            None => return PumpEnd::Eof,
            Some(Ok(line)) => match decode_line(&line) {
                None => continue,
                Some(decoded) => decoded.map_err(Into::into),
            },
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                Err(ProtocolError::FrameTooLarge {
                    size: max_frame_bytes.saturating_add(1),
                    limit: max_frame_bytes,
                }
                .into())
            }
            Some(Err(LinesCodecError::Io(err))) => {
                return PumpEnd::Failed(TransportError::Io(err.to_string()));
            }
        };
        if sender.send(item).await.is_err() {
            return PumpEnd::ReceiverGone;
        }
    }
}

/// Serialized writer of newline-delimited JSON frames.
pub(super) struct LineWriter<W> {
    inner: tokio::sync::Mutex<Option<FramedWrite<W, LinesCodec>>>,
}

impl<W> LineWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub(super) fn new(writer: W) -> Self {
        Self {
            inner: tokio::sync::Mutex::new(Some(FramedWrite::new(writer, LinesCodec::new()))),
        }
    }

    /// Writes one frame followed by a newline and flushes.
    pub(super) async fn write_frame(&self, frame: &Value) -> Result<(), TransportError> {
        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::AlreadyClosed)?;
        writer
            .send(frame.to_string())
            .await
            .map_err(|err| TransportError::Io(err.to_string()))
    }

    /// Flushes and closes the writer; later writes fail.
    pub(super) async fn shutdown(&self) {
        let Some(mut writer) = self.inner.lock().await.take() else {
            return;
        };
        match tokio::time::timeout(CLOSE_FLUSH_LIMIT, SinkExt::<String>::close(&mut writer)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(error = %err, "error closing frame writer"),
            Err(_) => debug!("peer stopped reading; dropping unflushed frames"),
        }
    }
}

/// Bounded buffer of the most recent diagnostic lines.
#[derive(Debug, Clone)]
pub struct DiagnosticTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl DiagnosticTail {
    /// Creates a buffer retaining at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    /// Appends a line, evicting the oldest when full.
    pub fn push(&self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Returns the retained lines, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn blank_lines_are_skipped() {
        assert!(decode_line("   ").is_none());
    }

    #[test]
    fn non_json_line_is_protocol_error() {
        assert!(matches!(
            decode_line("server starting..."),
            Some(Err(ProtocolError::InvalidJson(_)))
        ));
    }

    #[test]
    fn tail_keeps_most_recent_lines() {
        let tail = DiagnosticTail::new(2);
        tail.push("one");
        tail.push("two");
        tail.push("three");
        assert_eq!(tail.snapshot(), vec!["two".to_owned(), "three".to_owned()]);
    }

    #[tokio::test]
    async fn pump_forwards_frames_and_reports_errors() {
        let (mut writer, reader) = tokio::io::duplex(4096);
        let (sender, mut receiver) = mpsc::channel(8);
        let pump = tokio::spawn(async move { pump_lines(reader, 64, &sender).await });

        writer
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\nnot json\n")
            .await
            .expect("write frames");
        drop(writer);

        let first = receiver.recv().await.expect("first item");
        assert_eq!(first, Ok(json!({"jsonrpc": "2.0", "id": 1, "result": {}})));
        let second = receiver.recv().await.expect("second item");
        assert!(matches!(second, Err(super::super::InboundError::Protocol(_))));
        assert!(matches!(pump.await.expect("pump task"), PumpEnd::Eof));
    }

    #[tokio::test]
    async fn oversized_line_is_reported_and_skipped() {
        let (mut writer, reader) = tokio::io::duplex(4096);
        let (sender, mut receiver) = mpsc::channel(8);
        let pump = tokio::spawn(async move { pump_lines(reader, 16, &sender).await });

        let long = format!("{{\"padding\":\"{}\"}}\n{{}}\n", "x".repeat(64));
        writer.write_all(long.as_bytes()).await.expect("write frames");
        drop(writer);

        let first = receiver.recv().await.expect("first item");
        assert!(matches!(
            first,
            Err(super::super::InboundError::Protocol(ProtocolError::FrameTooLarge { limit: 16, .. }))
        ));
        assert_eq!(receiver.recv().await.expect("second item"), Ok(json!({})));
        assert!(matches!(pump.await.expect("pump task"), PumpEnd::Eof));
    }

    #[tokio::test]
    async fn writer_rejects_frames_after_shutdown() {
        let (writer, _reader) = tokio::io::duplex(4096);
        let line_writer = LineWriter::new(writer);
        line_writer.write_frame(&json!({"a": 1})).await.expect("first write");
        line_writer.shutdown().await;
        assert_eq!(
            line_writer.write_frame(&json!({"a": 2})).await,
            Err(TransportError::AlreadyClosed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_gives_up_on_a_peer_that_stops_reading() {
        let (writer, _reader) = tokio::io::duplex(16);
        let line_writer = LineWriter::new(writer);
        let frame = json!({"padding": "x".repeat(64)});

        let stuck =
            tokio::time::timeout(Duration::from_millis(50), line_writer.write_frame(&frame)).await;
        assert!(stuck.is_err(), "write should block on a full pipe");

        tokio::time::timeout(Duration::from_secs(5), line_writer.shutdown())
            .await
            .expect("shutdown returns despite unflushed bytes");
    }
}
