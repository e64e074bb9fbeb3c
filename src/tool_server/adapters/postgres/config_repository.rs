//! `PostgreSQL` repository for tool server configurations.

use super::{ToolServerPgPool, models::ServerRow, run_blocking, schema::tool_servers};
use crate::tool_server::{
    domain::{
        PersistedServerConfigData, ServerConfig, ServerId, ServerName, TemplateId,
        TransportConfig,
    },
    ports::{ServerConfigRepository, ServerConfigRepositoryError, ServerConfigRepositoryResult},
};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

const TEMPLATE_UNIQUE_INDEX: &str = "idx_tool_servers_template";

/// `PostgreSQL`-backed [`ServerConfigRepository`].
#[derive(Debug, Clone)]
pub struct PostgresServerConfigRepository {
    pool: ToolServerPgPool,
}

impl PostgresServerConfigRepository {
    /// Creates a repository over `pool`.
    #[must_use]
    pub const fn new(pool: ToolServerPgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServerConfigRepository for PostgresServerConfigRepository {
    async fn insert(&self, config: &ServerConfig) -> ServerConfigRepositoryResult<()> {
        let row = to_row(config)?;
        let server_id = config.id();
        let template_id = config.template_id().cloned();

        run_blocking(&self.pool, move |connection| {
            diesel::insert_into(tool_servers::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| write_error(err, server_id, template_id.as_ref()))?;
            Ok(())
        })
        .await
    }

    async fn update(&self, config: &ServerConfig) -> ServerConfigRepositoryResult<()> {
        let row = to_row(config)?;
        let server_id = config.id();
        let template_id = config.template_id().cloned();

        run_blocking(&self.pool, move |connection| {
            let updated = diesel::update(tool_servers::table.filter(tool_servers::id.eq(row.id)))
                .set((
                    tool_servers::name.eq(&row.name),
                    tool_servers::template_id.eq(&row.template_id),
                    tool_servers::transport.eq(&row.transport),
                    tool_servers::enabled.eq(row.enabled),
                    tool_servers::updated_at.eq(row.updated_at),
                ))
                .execute(connection)
                .map_err(|err| write_error(err, server_id, template_id.as_ref()))?;

            if updated == 0 {
                return Err(ServerConfigRepositoryError::NotFound(server_id));
            }
            Ok(())
        })
        .await
    }

    async fn remove(&self, server_id: ServerId) -> ServerConfigRepositoryResult<bool> {
        run_blocking(&self.pool, move |connection| {
            let removed = diesel::delete(
                tool_servers::table.filter(tool_servers::id.eq(server_id.into_inner())),
            )
            .execute(connection)
            .map_err(ServerConfigRepositoryError::persistence)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn find_by_id(
        &self,
        server_id: ServerId,
    ) -> ServerConfigRepositoryResult<Option<ServerConfig>> {
        run_blocking(&self.pool, move |connection| {
            tool_servers::table
                .filter(tool_servers::id.eq(server_id.into_inner()))
                .select(ServerRow::as_select())
                .first::<ServerRow>(connection)
                .optional()
                .map_err(ServerConfigRepositoryError::persistence)?
                .map(row_to_config)
                .transpose()
        })
        .await
    }

    async fn find_by_template(
        &self,
        template_id: &TemplateId,
    ) -> ServerConfigRepositoryResult<Option<ServerConfig>> {
        let template = template_id.as_str().to_owned();
        run_blocking(&self.pool, move |connection| {
            tool_servers::table
                .filter(tool_servers::template_id.eq(&template))
                .select(ServerRow::as_select())
                .first::<ServerRow>(connection)
                .optional()
                .map_err(ServerConfigRepositoryError::persistence)?
                .map(row_to_config)
                .transpose()
        })
        .await
    }

    async fn list_all(&self) -> ServerConfigRepositoryResult<Vec<ServerConfig>> {
        run_blocking(&self.pool, move |connection| {
            tool_servers::table
                .order(tool_servers::created_at.asc())
                .select(ServerRow::as_select())
                .load::<ServerRow>(connection)
                .map_err(ServerConfigRepositoryError::persistence)?
                .into_iter()
                .map(row_to_config)
                .collect()
        })
        .await
    }
}

fn to_row(config: &ServerConfig) -> ServerConfigRepositoryResult<ServerRow> {
    let transport = serde_json::to_value(config.transport())
        .map_err(ServerConfigRepositoryError::persistence)?;
    Ok(ServerRow {
        id: config.id().into_inner(),
        name: config.name().as_str().to_owned(),
        template_id: config.template_id().map(|id| id.as_str().to_owned()),
        transport,
        enabled: config.is_enabled(),
        created_at: config.created_at(),
        updated_at: config.updated_at(),
    })
}

fn row_to_config(row: ServerRow) -> ServerConfigRepositoryResult<ServerConfig> {
    let ServerRow {
        id,
        name,
        template_id,
        transport,
        enabled,
        created_at,
        updated_at,
    } = row;

    let parsed_name =
        ServerName::new(name).map_err(ServerConfigRepositoryError::invalid_persisted_data)?;
    let parsed_template = template_id
        .map(TemplateId::new)
        .transpose()
        .map_err(ServerConfigRepositoryError::invalid_persisted_data)?;
    let parsed_transport: TransportConfig = serde_json::from_value(transport)
        .map_err(ServerConfigRepositoryError::invalid_persisted_data)?;

    Ok(ServerConfig::from_persisted(PersistedServerConfigData {
        id: ServerId::from_uuid(id),
        name: parsed_name,
        template_id: parsed_template,
        transport: parsed_transport,
        enabled,
        created_at,
        updated_at,
    }))
}

fn write_error(
    err: DieselError,
    server_id: ServerId,
    template_id: Option<&TemplateId>,
) -> ServerConfigRepositoryError {
    let template_violation = match &err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            Some(is_template_violation(info.as_ref()))
        }
        _ => None,
    };
    match (template_violation, template_id) {
        (Some(true), Some(template)) => {
            ServerConfigRepositoryError::DuplicateTemplate(template.clone())
        }
        (Some(false), _) => ServerConfigRepositoryError::DuplicateServer(server_id),
        _ => ServerConfigRepositoryError::persistence(err),
    }
}

fn is_template_violation(info: &dyn DatabaseErrorInformation) -> bool {
    info.constraint_name()
        .is_some_and(|name| name == TEMPLATE_UNIQUE_INDEX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockable::DefaultClock;

    #[test]
    fn rows_round_trip_through_domain() {
        let name = ServerName::new("Filesystem").expect("valid name");
        let transport = TransportConfig::process("mcp-fs").expect("valid transport");
        let config = ServerConfig::new(name, transport, &DefaultClock)
            .with_template(TemplateId::new("filesystem").expect("valid template"));

        let row = to_row(&config).expect("row");
        assert_eq!(row.template_id.as_deref(), Some("filesystem"));

        let restored = row_to_config(row).expect("config");
        assert_eq!(restored, config);
    }

    #[test]
    fn invalid_rows_are_reported_as_persisted_data_errors() {
        let row = ServerRow {
            id: uuid::Uuid::new_v4(),
            name: "   ".to_owned(),
            template_id: None,
            transport: serde_json::json!({"kind": "process"}),
            enabled: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let err = row_to_config(row).expect_err("blank name is rejected");
        assert!(matches!(
            err,
            ServerConfigRepositoryError::InvalidPersistedData(_)
        ));
    }
}
