//! Durable sink for discovered tool catalogs.

use crate::tool_server::domain::{ServerId, ToolCatalog};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for tool schema store operations.
pub type ToolSchemaStoreResult<T> = Result<T, ToolSchemaStoreError>;

/// Persists the last discovered catalog per server so it survives restarts.
#[async_trait]
pub trait ToolSchemaStore: Send + Sync {
    /// Replaces the stored catalog for `server_id`.
    async fn replace(&self, server_id: ServerId, catalog: &ToolCatalog)
    -> ToolSchemaStoreResult<()>;

    /// Loads the stored catalog, if any.
    async fn load(&self, server_id: ServerId) -> ToolSchemaStoreResult<Option<ToolCatalog>>;

    /// Deletes the stored catalog.
    async fn remove(&self, server_id: ServerId) -> ToolSchemaStoreResult<()>;
}

/// Errors returned by tool schema stores.
#[derive(Debug, Clone, Error)]
pub enum ToolSchemaStoreError {
    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted tool schema data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ToolSchemaStoreError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
