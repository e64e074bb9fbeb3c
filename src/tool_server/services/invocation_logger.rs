//! Audit sink wrapper that turns finished calls into invocation records.

use crate::tool_server::{
    domain::{
        ArgumentDigest, InvocationFailure, InvocationRecord, InvocationRecordData, ServerId,
        truncate_preview,
    },
    ports::{InvocationLog, InvocationLogResult},
    session::InvocationError,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A tool call that has returned, successfully or not.
#[derive(Debug, Clone, Copy)]
pub struct CompletedCall<'a> {
    /// Target server.
    pub server_id: ServerId,
    /// Requested tool.
    pub tool: &'a str,
    /// Arguments as sent.
    pub arguments: &'a Value,
    /// Result payload or typed failure.
    pub outcome: Result<&'a Value, &'a InvocationError>,
    /// Dispatch timestamp.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration: Duration,
}

/// Builds one [`InvocationRecord`] per call and appends it to a log.
///
/// A failing log never affects the call it describes; the failure is only
/// reported through tracing.
pub struct InvocationLogger<L> {
    log: Arc<L>,
    preview_chars: usize,
}

impl<L> Clone for InvocationLogger<L> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            preview_chars: self.preview_chars,
        }
    }
}

impl<L> InvocationLogger<L>
where
    L: InvocationLog,
{
    /// Creates a logger truncating previews to `preview_chars` characters.
    #[must_use]
    pub const fn new(log: Arc<L>, preview_chars: usize) -> Self {
        Self { log, preview_chars }
    }

    /// Records `call` and returns the appended record.
    pub async fn record(&self, call: CompletedCall<'_>) -> InvocationRecord {
        let record = self.build(call);
        if let Err(err) = self.log.append(&record).await {
            warn!(
                server_id = %record.server_id(),
                tool = record.tool_name(),
                error = %err,
                "failed to append invocation record"
            );
        }
        record
    }

    /// Returns every record stored for `server_id`.
    ///
    /// # Errors
    ///
    /// Returns the underlying log's read failure.
    pub async fn history(&self, server_id: ServerId) -> InvocationLogResult<Vec<InvocationRecord>> {
        self.log.list_for_server(server_id).await
    }

    fn build(&self, call: CompletedCall<'_>) -> InvocationRecord {
        let (result_preview, failure) = match call.outcome {
            Ok(result) => (Some(truncate_preview(&result.to_string(), self.preview_chars)), None),
            Err(err) => (
                None,
                Some(InvocationFailure {
                    kind: err.failure_kind(),
                    summary: truncate_preview(&err.to_string(), self.preview_chars),
                }),
            ),
        };
        InvocationRecord::new(InvocationRecordData {
            server_id: call.server_id,
            tool_name: call.tool.to_owned(),
            argument_digest: ArgumentDigest::of(call.arguments),
            arguments_preview: truncate_preview(&call.arguments.to_string(), self.preview_chars),
            result_preview,
            failure,
            duration: call.duration,
            started_at: call.started_at,
        })
    }
}
