//! Diesel row models for tool server persistence.

use super::schema::{tool_invocations, tool_schemas, tool_servers};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Row for a configured tool server.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tool_servers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ServerRow {
    /// Server identifier.
    pub id: uuid::Uuid,
    /// Display name.
    pub name: String,
    /// Catalog template identifier.
    pub template_id: Option<String>,
    /// Transport configuration payload.
    pub transport: Value,
    /// Enabled flag.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model for a stored tool catalog.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tool_schemas)]
pub struct NewSchemaRow {
    /// Owning server.
    pub server_id: uuid::Uuid,
    /// Tool descriptors.
    pub tools: Value,
}

/// Row for one invocation record.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tool_invocations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct InvocationRow {
    /// Record identifier.
    pub id: uuid::Uuid,
    /// Target server.
    pub server_id: uuid::Uuid,
    /// Requested tool.
    pub tool_name: String,
    /// Argument digest.
    pub argument_digest: String,
    /// Argument preview.
    pub arguments_preview: String,
    /// Result preview.
    pub result_preview: Option<String>,
    /// Failure category.
    pub failure_kind: Option<String>,
    /// Failure summary.
    pub failure_summary: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: i64,
    /// Dispatch timestamp.
    pub started_at: DateTime<Utc>,
}
