//! Append-only sink for invocation audit records.

use crate::tool_server::domain::{InvocationRecord, ServerId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for invocation log operations.
pub type InvocationLogResult<T> = Result<T, InvocationLogError>;

/// Audit sink for tool invocations. Records are never mutated.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InvocationLog: Send + Sync {
    /// Appends one record.
    async fn append(&self, record: &InvocationRecord) -> InvocationLogResult<()>;

    /// Returns the records for `server_id`, oldest first.
    async fn list_for_server(&self, server_id: ServerId)
    -> InvocationLogResult<Vec<InvocationRecord>>;
}

/// Errors returned by invocation logs.
#[derive(Debug, Clone, Error)]
pub enum InvocationLogError {
    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted invocation data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl InvocationLogError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
