//! Port contracts consumed by the tool server manager.

mod catalog;
mod invocation_log;
mod repository;
mod schema_store;

pub use catalog::{CatalogSourceError, CatalogSourceResult, CatalogTemplateSource};
pub use invocation_log::{InvocationLog, InvocationLogError, InvocationLogResult};
#[cfg(test)]
pub use invocation_log::MockInvocationLog;
pub use repository::{
    ServerConfigRepository, ServerConfigRepositoryError, ServerConfigRepositoryResult,
};
pub use schema_store::{ToolSchemaStore, ToolSchemaStoreError, ToolSchemaStoreResult};
