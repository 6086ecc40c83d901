use rmcp::model::ErrorCode;
use rmcp::service::ServiceError;
use rmcp::ErrorData;
use serde_json::{json, Value as J};
use thiserror::Error;

use crate::core::mcp::codes;

/// Failure raised by a tool implementation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Execution(String),
}

/// Outcome of routing a call through the dispatcher.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("tool `{tool}` failed: {reason}")]
    Execution { tool: String, reason: String },
}

impl DispatchError {
    pub fn from_tool(tool: &str, e: ToolError) -> Self {
        match e {
            ToolError::InvalidArguments(reason) => {
                DispatchError::InvalidArguments { tool: tool.to_owned(), reason }
            }
            ToolError::Execution(reason) => DispatchError::Execution { tool: tool.to_owned(), reason },
        }
    }

    pub fn rpc_code(&self) -> i32 {
        match self {
            DispatchError::NotFound(_) => codes::TOOL_NOT_FOUND,
            DispatchError::InvalidArguments { .. } => codes::INVALID_PARAMS,
            DispatchError::Execution { .. } => codes::EXECUTION_ERROR,
        }
    }

    pub fn tool(&self) -> &str {
        match self {
            DispatchError::NotFound(tool)
            | DispatchError::InvalidArguments { tool, .. }
            | DispatchError::Execution { tool, .. } => tool,
        }
    }

    /// Wire form; `data.tool` and `data.reason` let clients rebuild the variant.
    pub fn to_error_data(&self) -> ErrorData {
        let reason = match self {
            DispatchError::NotFound(_) => J::Null,
            DispatchError::InvalidArguments { reason, .. } | DispatchError::Execution { reason, .. } => {
                J::String(reason.clone())
            }
        };
        ErrorData::new(
            ErrorCode(self.rpc_code()),
            self.to_string(),
            Some(json!({ "tool": self.tool(), "reason": reason })),
        )
    }
}

/// Client-side error taxonomy for an MCP session.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum McpError {
    #[error("protocol order violation: {0}")]
    ProtocolOrder(String),
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("tool `{tool}` failed: {reason}")]
    Execution { tool: String, reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream status {0}")]
    HttpStatus(u16),
    #[error("request cancelled: {0}")]
    Cancelled(String),
    #[error("server error {code}: {message}")]
    Rpc { code: i32, message: String },
}

impl McpError {
    /// Only transport failures are worth retrying with the same arguments.
    pub fn is_transient(&self) -> bool {
        matches!(self, McpError::Transport(_))
    }

    /// Failures the caller caused or the tool reported; a model can react to
    /// these by changing its request.
    pub fn is_tool_fault(&self) -> bool {
        matches!(
            self,
            McpError::NotFound(_) | McpError::InvalidArguments { .. } | McpError::Execution { .. }
        )
    }

    /// Rebuild a typed error from a JSON-RPC error object.
    pub fn from_error_data(err: ErrorData, tool: Option<&str>) -> Self {
        let data = err.data.unwrap_or(J::Null);
        let tool = data
            .get("tool")
            .and_then(J::as_str)
            .or(tool)
            .unwrap_or_default()
            .to_owned();
        let reason = data
            .get("reason")
            .and_then(J::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| err.message.to_string());
        match err.code.0 {
            codes::TOOL_NOT_FOUND => McpError::NotFound(tool),
            codes::INVALID_PARAMS => McpError::InvalidArguments { tool, reason },
            codes::EXECUTION_ERROR => McpError::Execution { tool, reason },
            code => McpError::Rpc { code, message: err.message.to_string() },
        }
    }

    /// Map an `rmcp` request failure; `tool` names the call when there is one.
    pub fn from_service(e: ServiceError, tool: Option<&str>) -> Self {
        let message = e.to_string();
        match e {
            ServiceError::McpError(data) => McpError::from_error_data(data, tool),
            ServiceError::Cancelled { .. } | ServiceError::Timeout { .. } => McpError::Cancelled(message),
            _ => McpError::Transport(message),
        }
    }
}

impl From<DispatchError> for McpError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::NotFound(tool) => McpError::NotFound(tool),
            DispatchError::InvalidArguments { tool, reason } => McpError::InvalidArguments { tool, reason },
            DispatchError::Execution { tool, reason } => McpError::Execution { tool, reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_displays_dispatch_errors() {
        let e = DispatchError::NotFound("divide".into());
        assert_eq!(e.to_string(), "tool not found: divide");
        let e = DispatchError::from_tool("add", ToolError::InvalidArguments("missing field `b`".into()));
        assert_eq!(e.to_string(), "invalid arguments for `add`: missing field `b`");
    }

    #[test]
    fn dispatch_errors_survive_the_wire() {
        let cases = [
            DispatchError::NotFound("divide".into()),
            DispatchError::InvalidArguments { tool: "add".into(), reason: "missing `b`".into() },
            DispatchError::Execution { tool: "multiply".into(), reason: "integer overflow".into() },
        ];
        for e in cases {
            let back = McpError::from_error_data(e.to_error_data(), None);
            assert_eq!(back, McpError::from(e));
        }
    }

    #[test]
    fn unknown_codes_stay_generic() {
        let e = McpError::from_error_data(
            ErrorData::new(ErrorCode(codes::METHOD_NOT_FOUND), "unknown method: x", None),
            Some("add"),
        );
        assert_eq!(e, McpError::Rpc { code: codes::METHOD_NOT_FOUND, message: "unknown method: x".into() });
        assert!(!e.is_transient());
        assert!(McpError::Transport("reset".into()).is_transient());
    }

    #[test]
    fn tool_faults_are_the_ones_a_model_can_fix() {
        assert!(McpError::NotFound("divide".into()).is_tool_fault());
        assert!(McpError::Execution { tool: "add".into(), reason: "overflow".into() }.is_tool_fault());
        assert!(!McpError::Transport("reset".into()).is_tool_fault());
        assert!(!McpError::Cancelled("closed".into()).is_tool_fault());
    }

    #[test]
    fn rpc_failures_from_the_service_keep_their_kind() {
        let data = DispatchError::NotFound("divide".into()).to_error_data();
        assert_eq!(
            McpError::from_service(ServiceError::McpError(data), Some("divide")),
            McpError::NotFound("divide".into())
        );
    }
}
