pub mod context;
pub mod mcp;
