//! Invocation log decorator that mirrors records onto `tracing`.

use crate::tool_server::{
    domain::{InvocationRecord, ServerId},
    ports::{InvocationLog, InvocationLogResult},
};
use async_trait::async_trait;
use tracing::{info, warn};

/// Emits each record on target `conduit::audit`, then delegates storage.
#[derive(Debug, Clone, Default)]
pub struct TracingInvocationLog<L> {
    inner: L,
}

impl<L> TracingInvocationLog<L> {
    /// Wraps `inner`.
    #[must_use]
    pub const fn new(inner: L) -> Self {
        Self { inner }
    }

    /// Returns the wrapped log.
    #[must_use]
    pub const fn inner(&self) -> &L {
        &self.inner
    }
}

#[async_trait]
impl<L> InvocationLog for TracingInvocationLog<L>
where
    L: InvocationLog,
{
    async fn append(&self, record: &InvocationRecord) -> InvocationLogResult<()> {
        let duration_ms = u64::try_from(record.duration().as_millis()).unwrap_or(u64::MAX);
        match record.failure() {
            None => info!(
                target: "conduit::audit",
                invocation_id = %record.id(),
                server_id = %record.server_id(),
                tool = record.tool_name(),
                argument_digest = %record.argument_digest(),
                duration_ms,
                success = true,
                "tool invocation"
            ),
            Some(failure) => warn!(
                target: "conduit::audit",
                invocation_id = %record.id(),
                server_id = %record.server_id(),
                tool = record.tool_name(),
                argument_digest = %record.argument_digest(),
                duration_ms,
                success = false,
                failure_kind = %failure.kind,
                error = %failure.summary,
                "tool invocation"
            ),
        }
        self.inner.append(record).await
    }

    async fn list_for_server(
        &self,
        server_id: ServerId,
    ) -> InvocationLogResult<Vec<InvocationRecord>> {
        self.inner.list_for_server(server_id).await
    }
}
