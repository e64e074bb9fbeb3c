//! `PostgreSQL` append-only invocation log.

use super::{ToolServerPgPool, models::InvocationRow, run_blocking, schema::tool_invocations};
use crate::tool_server::{
    domain::{
        ArgumentDigest, InvocationFailure, InvocationFailureKind, InvocationId, InvocationRecord,
        InvocationRecordData, ServerId,
    },
    ports::{InvocationLog, InvocationLogError, InvocationLogResult},
};
use async_trait::async_trait;
use diesel::prelude::*;
use std::time::Duration;

/// `PostgreSQL`-backed [`InvocationLog`].
#[derive(Debug, Clone)]
pub struct PostgresInvocationLog {
    pool: ToolServerPgPool,
}

impl PostgresInvocationLog {
    /// Creates a log over `pool`.
    #[must_use]
    pub const fn new(pool: ToolServerPgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvocationLog for PostgresInvocationLog {
    async fn append(&self, record: &InvocationRecord) -> InvocationLogResult<()> {
        let row = to_row(record)?;
        run_blocking(&self.pool, move |connection| {
            diesel::insert_into(tool_invocations::table)
                .values(&row)
                .execute(connection)
                .map_err(InvocationLogError::persistence)?;
            Ok(())
        })
        .await
    }

    async fn list_for_server(
        &self,
        server_id: ServerId,
    ) -> InvocationLogResult<Vec<InvocationRecord>> {
        run_blocking(&self.pool, move |connection| {
            tool_invocations::table
                .filter(tool_invocations::server_id.eq(server_id.into_inner()))
                .order(tool_invocations::started_at.asc())
                .select(InvocationRow::as_select())
                .load::<InvocationRow>(connection)
                .map_err(InvocationLogError::persistence)?
                .into_iter()
                .map(row_to_record)
                .collect()
        })
        .await
    }
}

fn to_row(record: &InvocationRecord) -> InvocationLogResult<InvocationRow> {
    let duration_ms =
        i64::try_from(record.duration().as_millis()).map_err(InvocationLogError::persistence)?;
    Ok(InvocationRow {
        id: record.id().into_inner(),
        server_id: record.server_id().into_inner(),
        tool_name: record.tool_name().to_owned(),
        argument_digest: record.argument_digest().as_str().to_owned(),
        arguments_preview: record.arguments_preview().to_owned(),
        result_preview: record.result_preview().map(str::to_owned),
        failure_kind: record.failure().map(|failure| failure.kind.as_str().to_owned()),
        failure_summary: record.failure().map(|failure| failure.summary.clone()),
        duration_ms,
        started_at: record.started_at(),
    })
}

fn row_to_record(row: InvocationRow) -> InvocationLogResult<InvocationRecord> {
    let InvocationRow {
        id,
        server_id,
        tool_name,
        argument_digest,
        arguments_preview,
        result_preview,
        failure_kind,
        failure_summary,
        duration_ms,
        started_at,
    } = row;

    let failure = failure_kind
        .map(|kind| {
            InvocationFailureKind::try_from(kind.as_str()).map(|parsed| InvocationFailure {
                kind: parsed,
                summary: failure_summary.unwrap_or_default(),
            })
        })
        .transpose()
        .map_err(InvocationLogError::invalid_persisted_data)?;
    let millis = u64::try_from(duration_ms).map_err(InvocationLogError::invalid_persisted_data)?;

    Ok(InvocationRecord::with_id(
        InvocationId::from_uuid(id),
        InvocationRecordData {
            server_id: ServerId::from_uuid(server_id),
            tool_name,
            argument_digest: ArgumentDigest::from_hex(argument_digest),
            arguments_preview,
            result_preview,
            failure,
            duration: Duration::from_millis(millis),
            started_at,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn record(failure: Option<InvocationFailure>) -> InvocationRecord {
        let arguments = json!({"path": "/tmp"});
        InvocationRecord::new(InvocationRecordData {
            server_id: ServerId::new(),
            tool_name: "read_file".to_owned(),
            argument_digest: ArgumentDigest::of(&arguments),
            arguments_preview: arguments.to_string(),
            result_preview: failure.is_none().then(|| "ok".to_owned()),
            failure,
            duration: Duration::from_millis(42),
            started_at: chrono::Utc::now(),
        })
    }

    #[rstest]
    #[case::success(None)]
    #[case::timeout(Some(InvocationFailure {
        kind: InvocationFailureKind::Timeout,
        summary: "timed out after 5s".to_owned(),
    }))]
    fn rows_preserve_outcome(#[case] failure: Option<InvocationFailure>) {
        let original = record(failure);

        let restored = row_to_record(to_row(&original).expect("row")).expect("record");

        assert_eq!(restored, original);
    }

    #[test]
    fn unknown_failure_kinds_are_invalid_data() {
        let mut row = to_row(&record(None)).expect("row");
        row.failure_kind = Some("exploded".to_owned());

        let err = row_to_record(row).expect_err("unknown kind");
        assert!(matches!(err, InvocationLogError::InvalidPersistedData(_)));
    }
}
