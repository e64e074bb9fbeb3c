//! Conduit: supervision of external MCP tool servers.
//!
//! This crate connects to tool servers over local processes, HTTP event
//! streams, and sockets, discovers the tools they expose, and correlates
//! concurrent tool calls with their replies, isolating each server's
//! failures from every other server.
//!
//! # Architecture
//!
//! Conduit follows hexagonal architecture principles:
//!
//! - **Domain**: Pure value types with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for persistence and catalogs
//! - **Adapters**: Concrete implementations of ports (memory, `PostgreSQL`)
//!
//! # Modules
//!
//! - [`tool_server`]: Transports, sessions, supervisor, and installer
//! - [`telemetry`]: Subscriber setup for binaries

pub mod telemetry;
pub mod tool_server;
