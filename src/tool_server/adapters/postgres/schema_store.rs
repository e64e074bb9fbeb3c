//! `PostgreSQL` store for discovered tool catalogs.

use super::{ToolServerPgPool, models::NewSchemaRow, run_blocking, schema::tool_schemas};
use crate::tool_server::{
    domain::{ServerId, ToolCatalog},
    ports::{ToolSchemaStore, ToolSchemaStoreError, ToolSchemaStoreResult},
};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use serde_json::Value;

/// `PostgreSQL`-backed [`ToolSchemaStore`].
#[derive(Debug, Clone)]
pub struct PostgresToolSchemaStore {
    pool: ToolServerPgPool,
}

impl PostgresToolSchemaStore {
    /// Creates a store over `pool`.
    #[must_use]
    pub const fn new(pool: ToolServerPgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ToolSchemaStore for PostgresToolSchemaStore {
    async fn replace(
        &self,
        server_id: ServerId,
        catalog: &ToolCatalog,
    ) -> ToolSchemaStoreResult<()> {
        let row = NewSchemaRow {
            server_id: server_id.into_inner(),
            tools: serde_json::to_value(catalog).map_err(ToolSchemaStoreError::persistence)?,
        };

        run_blocking(&self.pool, move |connection| {
            diesel::insert_into(tool_schemas::table)
                .values(&row)
                .on_conflict(tool_schemas::server_id)
                .do_update()
                .set((
                    tool_schemas::tools.eq(excluded(tool_schemas::tools)),
                    tool_schemas::updated_at.eq(diesel::dsl::now),
                ))
                .execute(connection)
                .map_err(ToolSchemaStoreError::persistence)?;
            Ok(())
        })
        .await
    }

    async fn load(&self, server_id: ServerId) -> ToolSchemaStoreResult<Option<ToolCatalog>> {
        run_blocking(&self.pool, move |connection| {
            tool_schemas::table
                .filter(tool_schemas::server_id.eq(server_id.into_inner()))
                .select(tool_schemas::tools)
                .first::<Value>(connection)
                .optional()
                .map_err(ToolSchemaStoreError::persistence)?
                .map(decode_catalog)
                .transpose()
        })
        .await
    }

    async fn remove(&self, server_id: ServerId) -> ToolSchemaStoreResult<()> {
        run_blocking(&self.pool, move |connection| {
            diesel::delete(
                tool_schemas::table.filter(tool_schemas::server_id.eq(server_id.into_inner())),
            )
            .execute(connection)
            .map_err(ToolSchemaStoreError::persistence)?;
            Ok(())
        })
        .await
    }
}

fn decode_catalog(tools: Value) -> ToolSchemaStoreResult<ToolCatalog> {
    serde_json::from_value(tools).map_err(ToolSchemaStoreError::invalid_persisted_data)
}
