//! In-memory adapters for every persistence port.

mod invocation_log;
mod repository;
mod schema_store;

pub use invocation_log::InMemoryInvocationLog;
pub use repository::InMemoryServerConfigRepository;
pub use schema_store::InMemoryToolSchemaStore;
