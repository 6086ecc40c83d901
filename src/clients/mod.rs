//! Outbound clients: the MCP session and the inference backend.

pub mod chat_completions;
pub mod session;
