//! Adapters implementing the tool server ports.

mod loopback;
pub mod memory;
pub mod postgres;
mod static_catalog;
mod tracing_log;

pub use loopback::{LoopbackCallMode, LoopbackConnector, LoopbackServer};
pub use static_catalog::StaticCatalog;
pub use tracing_log::TracingInvocationLog;
