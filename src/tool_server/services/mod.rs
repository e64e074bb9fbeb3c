//! Application services for supervising and installing tool servers.

mod installer;
mod invocation_logger;
mod supervisor;

pub use installer::{CatalogInstaller, InstallError, InstallReport, InstallRequest, build_config};
pub use invocation_logger::{CompletedCall, InvocationLogger};
pub use supervisor::{SupervisorError, SupervisorPorts, SupervisorResult, ToolServerSupervisor};
