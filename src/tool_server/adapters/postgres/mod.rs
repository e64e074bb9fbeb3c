//! `PostgreSQL` adapters for tool server persistence.

mod config_repository;
mod invocation_log;
mod models;
mod schema;
mod schema_store;

pub use config_repository::PostgresServerConfigRepository;
pub use invocation_log::PostgresInvocationLog;
pub use schema_store::PostgresToolSchemaStore;

use crate::tool_server::ports::{
    InvocationLogError, ServerConfigRepositoryError, ToolSchemaStoreError,
};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

/// `PostgreSQL` connection pool shared by the tool server adapters.
pub type ToolServerPgPool = Pool<ConnectionManager<PgConnection>>;

trait PersistenceFailure: Sized {
    fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self;
}

impl PersistenceFailure for ServerConfigRepositoryError {
    fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::persistence(err)
    }
}

impl PersistenceFailure for ToolSchemaStoreError {
    fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::persistence(err)
    }
}

impl PersistenceFailure for InvocationLogError {
    fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::persistence(err)
    }
}

/// Runs `operation` on a pooled connection off the async runtime.
async fn run_blocking<F, T, E>(pool: &ToolServerPgPool, operation: F) -> Result<T, E>
where
    F: FnOnce(&mut PgConnection) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: PersistenceFailure + Send + 'static,
{
    let shared = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut connection = shared.get().map_err(E::persistence)?;
        operation(&mut connection)
    })
    .await
    .map_err(E::persistence)?
}
