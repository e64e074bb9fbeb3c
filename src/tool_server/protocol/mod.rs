//! Wire-level message shapes exchanged with tool servers.
//!
//! Every transport carries the same JSON-RPC 2.0 envelopes; this module
//! builds outbound frames, classifies inbound ones, and decodes the MCP
//! method payloads used for handshake, discovery, and invocation.

mod jsonrpc;
mod mcp;

pub use jsonrpc::{
    Inbound, JSONRPC_VERSION, METHOD_NOT_FOUND, ProtocolError, RpcErrorObject, error_response,
    notification, request, result_response,
};
pub use mcp::{
    CallToolOutcome, InitializeResult, LogMessage, PROTOCOL_VERSION, ServerNotification,
    ToolsPage, call_tool_params, decode_call_result, decode_initialize, decode_tools_page,
    initialize_params, list_tools_params, methods,
};
