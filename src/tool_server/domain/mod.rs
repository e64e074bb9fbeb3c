//! Domain model for tool servers, sessions, tools, and invocation audit.
//!
//! The domain models server identity, transport configuration, session
//! lifecycle states, discovered tool schemas, invocation records, and
//! catalog templates. Infrastructure concerns remain outside this boundary.

mod error;
mod ids;
mod invocation;
mod server;
mod state;
mod template;
mod tool;
mod transport;

pub use error::{
    ParseFailureKindError, ParseSessionStateError, ParseTransportKindError, ToolServerDomainError,
};
pub use ids::{InvocationId, ServerId, ServerName, TemplateId};
pub use invocation::{
    ArgumentDigest, InvocationFailure, InvocationFailureKind, InvocationRecord,
    InvocationRecordData, truncate_preview,
};
pub use server::{PersistedServerConfigData, ServerConfig};
pub use state::{ServerStatus, SessionState};
pub use template::{CatalogTemplate, TemplateField, TransportTemplate};
pub use tool::{ToolCatalog, ToolSchema};
pub use transport::{
    EventStreamTransportConfig, ProcessTransportConfig, SocketTransportConfig, TransportConfig,
    TransportKind,
};
