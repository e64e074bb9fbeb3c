//! In-memory invocation log.

use crate::tool_server::{
    domain::{InvocationRecord, ServerId},
    ports::{InvocationLog, InvocationLogError, InvocationLogResult},
};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Thread-safe append-only invocation log held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInvocationLog {
    records: Arc<RwLock<Vec<InvocationRecord>>>,
}

impl InMemoryInvocationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationLogError::Persistence`] when the lock is poisoned.
    pub fn records(&self) -> InvocationLogResult<Vec<InvocationRecord>> {
        Ok(self.records.read().map_err(lock_error)?.clone())
    }
}

fn lock_error(err: impl std::fmt::Display) -> InvocationLogError {
    InvocationLogError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl InvocationLog for InMemoryInvocationLog {
    async fn append(&self, record: &InvocationRecord) -> InvocationLogResult<()> {
        self.records.write().map_err(lock_error)?.push(record.clone());
        Ok(())
    }

    async fn list_for_server(
        &self,
        server_id: ServerId,
    ) -> InvocationLogResult<Vec<InvocationRecord>> {
        Ok(self
            .records
            .read()
            .map_err(lock_error)?
            .iter()
            .filter(|record| record.server_id() == server_id)
            .cloned()
            .collect())
    }
}
