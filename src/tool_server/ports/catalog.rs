//! Read-only source of catalog templates.

use crate::tool_server::domain::{CatalogTemplate, TemplateId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for catalog source operations.
pub type CatalogSourceResult<T> = Result<T, CatalogSourceError>;

/// Static catalog of installable tool server templates.
#[async_trait]
pub trait CatalogTemplateSource: Send + Sync {
    /// Finds a template by identifier.
    async fn find(&self, template_id: &TemplateId) -> CatalogSourceResult<Option<CatalogTemplate>>;

    /// Returns every template.
    async fn list(&self) -> CatalogSourceResult<Vec<CatalogTemplate>>;
}

/// Errors returned by catalog sources.
#[derive(Debug, Clone, Error)]
pub enum CatalogSourceError {
    /// The catalog could not be read.
    #[error("catalog source unavailable: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),
}

impl CatalogSourceError {
    /// Wraps a read or decode failure.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }
}
