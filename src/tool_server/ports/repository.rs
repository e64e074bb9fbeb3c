//! Repository port for durable server configurations.

use crate::tool_server::domain::{ServerConfig, ServerId, TemplateId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for server configuration repository operations.
pub type ServerConfigRepositoryResult<T> = Result<T, ServerConfigRepositoryError>;

/// Persistence contract for server configurations.
#[async_trait]
pub trait ServerConfigRepository: Send + Sync {
    /// Stores a new configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerConfigRepositoryError::DuplicateServer`] when the ID
    /// already exists or [`ServerConfigRepositoryError::DuplicateTemplate`]
    /// when another configuration was installed from the same template.
    async fn insert(&self, config: &ServerConfig) -> ServerConfigRepositoryResult<()>;

    /// Replaces an existing configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerConfigRepositoryError::NotFound`] when the server does
    /// not exist.
    async fn update(&self, config: &ServerConfig) -> ServerConfigRepositoryResult<()>;

    /// Deletes a configuration. Returns whether one was removed.
    async fn remove(&self, server_id: ServerId) -> ServerConfigRepositoryResult<bool>;

    /// Finds a configuration by identifier.
    async fn find_by_id(
        &self,
        server_id: ServerId,
    ) -> ServerConfigRepositoryResult<Option<ServerConfig>>;

    /// Finds the configuration installed from `template_id`.
    async fn find_by_template(
        &self,
        template_id: &TemplateId,
    ) -> ServerConfigRepositoryResult<Option<ServerConfig>>;

    /// Returns every stored configuration.
    async fn list_all(&self) -> ServerConfigRepositoryResult<Vec<ServerConfig>>;
}

/// Errors returned by server configuration repositories.
#[derive(Debug, Clone, Error)]
pub enum ServerConfigRepositoryError {
    /// A configuration with the same identifier already exists.
    #[error("duplicate tool server identifier: {0}")]
    DuplicateServer(ServerId),

    /// A configuration installed from the same template already exists.
    #[error("a tool server from template {0} is already registered")]
    DuplicateTemplate(TemplateId),

    /// The configuration was not found.
    #[error("tool server not found: {0}")]
    NotFound(ServerId),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted tool server data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ServerConfigRepositoryError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
