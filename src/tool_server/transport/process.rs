//! Tool servers spawned as child processes speaking over stdio.

use super::framing::{DiagnosticTail, LineWriter, PumpEnd, pump_lines};
use super::{Connection, ConnectError, FrameSink, InboundItem, TransportError};
use crate::tool_server::domain::{ProcessTransportConfig, ServerId};
use crate::tool_server::settings::ManagerSettings;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

const INBOUND_BUFFER: usize = 64;
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Spawns the configured command and wires its stdio into a connection.
pub(super) fn open(
    server_id: ServerId,
    config: &ProcessTransportConfig,
    settings: &ManagerSettings,
) -> Result<Connection, ConnectError> {
    let mut command = Command::new(config.command());
    command
        .args(config.args())
        .envs(config.env())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(directory) = config.working_directory() {
        command.current_dir(directory);
    }

    let spawn_error = |reason: String| ConnectError::Spawn {
        command: config.command().to_owned(),
        reason,
    };
    let mut child = command.spawn().map_err(|err| spawn_error(err.to_string()))?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| spawn_error("stdin was not captured".to_owned()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| spawn_error("stdout was not captured".to_owned()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| spawn_error("stderr was not captured".to_owned()))?;

    info!(
        server_id = %server_id,
        command = config.command(),
        pid = child.id(),
        "spawned tool server process"
    );

    let diagnostics = DiagnosticTail::new(settings.stderr_tail_lines);
    tokio::spawn(capture_stderr(
        server_id,
        stderr,
        diagnostics.clone(),
        settings.max_frame_bytes,
    ));

    let (sender, receiver) = mpsc::channel(INBOUND_BUFFER);
    let (kill_sender, kill_receiver) = oneshot::channel();
    tokio::spawn(supervise_child(ChildPump {
        server_id,
        child,
        stdout,
        sender,
        kill: kill_receiver,
        max_frame_bytes: settings.max_frame_bytes,
    }));

    let sink = ProcessSink {
        writer: LineWriter::new(stdin),
        kill: Mutex::new(Some(kill_sender)),
        diagnostics,
    };
    Ok(Connection::from_channel(Arc::new(sink), receiver))
}

struct ChildPump {
    server_id: ServerId,
    child: Child,
    stdout: tokio::process::ChildStdout,
    sender: mpsc::Sender<InboundItem>,
    kill: oneshot::Receiver<()>,
    max_frame_bytes: usize,
}

async fn supervise_child(pump: ChildPump) {
    let ChildPump {
        server_id,
        mut child,
        stdout,
        sender,
        mut kill,
        max_frame_bytes,
    } = pump;

    let read = pump_lines(stdout, max_frame_bytes, &sender);
    tokio::pin!(read);
    let ended = tokio::select! {
        end = &mut read => Some(end),
        _ = &mut kill => None,
    };

    let Some(end) = ended else {
        if let Err(err) = child.kill().await {
            debug!(server_id = %server_id, error = %err, "failed to kill tool server process");
        }
        debug!(server_id = %server_id, "tool server process stopped");
        return;
    };

    if let PumpEnd::Failed(err) = &end {
        warn!(server_id = %server_id, error = %err, "tool server stdout failed");
    }
    let status = match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
        Ok(Ok(status)) => describe_exit(status),
        Ok(Err(err)) => format!("wait failed: {err}"),
        Err(_) => {
            if let Err(err) = child.kill().await {
                debug!(server_id = %server_id, error = %err, "failed to kill tool server process");
            }
            "stdout closed while running".to_owned()
        }
    };
    warn!(server_id = %server_id, status = %status, "tool server process exited");
    if !matches!(end, PumpEnd::ReceiverGone)
        && sender
            .send(Err(TransportError::ProcessExited { status }.into()))
            .await
            .is_err()
    {
        debug!(server_id = %server_id, "session dropped before process exit was reported");
    }
}

fn describe_exit(status: ExitStatus) -> String {
    status.code().map_or_else(
        || "terminated by signal".to_owned(),
        |code| format!("exit code {code}"),
    )
}

async fn capture_stderr(
    server_id: ServerId,
    stderr: ChildStderr,
    diagnostics: DiagnosticTail,
    max_line_bytes: usize,
) {
    let mut lines = FramedRead::new(stderr, LinesCodec::new_with_max_length(max_line_bytes));
    while let Some(line) = lines.next().await {
        match line {
            Ok(text) => {
                debug!(server_id = %server_id, line = %text, "tool server stderr");
                diagnostics.push(text);
            }
            Err(err) => {
                debug!(server_id = %server_id, error = %err, "stopped reading tool server stderr");
                break;
            }
        }
    }
}

struct ProcessSink {
    writer: LineWriter<ChildStdin>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
    diagnostics: DiagnosticTail,
}

#[async_trait]
impl FrameSink for ProcessSink {
    async fn send(&self, frame: Value) -> Result<(), TransportError> {
        self.writer.write_frame(&frame).await
    }

    async fn close(&self) {
        self.writer.shutdown().await;
        let kill = self
            .kill
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if kill.is_some_and(|signal| signal.send(()).is_err()) {
            debug!("tool server process already exited");
        }
    }

    fn diagnostics(&self) -> Vec<String> {
        self.diagnostics.snapshot()
    }
}
