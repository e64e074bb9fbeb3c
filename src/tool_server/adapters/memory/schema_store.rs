//! In-memory tool schema store.

use crate::tool_server::{
    domain::{ServerId, ToolCatalog},
    ports::{ToolSchemaStore, ToolSchemaStoreError, ToolSchemaStoreResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory catalog store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryToolSchemaStore {
    catalogs: Arc<RwLock<HashMap<ServerId, ToolCatalog>>>,
}

impl InMemoryToolSchemaStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: impl std::fmt::Display) -> ToolSchemaStoreError {
    ToolSchemaStoreError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl ToolSchemaStore for InMemoryToolSchemaStore {
    async fn replace(
        &self,
        server_id: ServerId,
        catalog: &ToolCatalog,
    ) -> ToolSchemaStoreResult<()> {
        self.catalogs
            .write()
            .map_err(lock_error)?
            .insert(server_id, catalog.clone());
        Ok(())
    }

    async fn load(&self, server_id: ServerId) -> ToolSchemaStoreResult<Option<ToolCatalog>> {
        Ok(self.catalogs.read().map_err(lock_error)?.get(&server_id).cloned())
    }

    async fn remove(&self, server_id: ServerId) -> ToolSchemaStoreResult<()> {
        self.catalogs.write().map_err(lock_error)?.remove(&server_id);
        Ok(())
    }
}
