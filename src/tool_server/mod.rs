//! Tool server supervision: connection lifecycle, tool discovery, and
//! correlated tool invocation across independently configured servers.
//!
//! The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Wire envelopes in [`protocol`]
//! - Transport adapters in [`transport`]
//! - Per-connection runtime in [`session`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod protocol;
pub mod services;
pub mod session;
pub mod settings;
pub mod transport;
