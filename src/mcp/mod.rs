//! MCP (Model Context Protocol) Server Implementation
//!
//! A small tool-hosting runtime: JSON-RPC 2.0 over newline-delimited stdio,
//! with `initialize`, `ping`, `tools/list` and `tools/call`.


pub mod errors;
pub mod protocol;
pub mod server;
pub mod validation;

pub use errors::{ErrorHandler, McpError, McpResult};
pub use protocol::*;
pub use server::{ConnectionState, McpServer, MessageHandler, ToolHandler};
