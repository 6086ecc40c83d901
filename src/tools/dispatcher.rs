use std::sync::Arc;
use std::time::Instant;

use rmcp::model::CallToolResult;
use serde::{Deserialize, Serialize};
use serde_json::Value as J;

use crate::core::error::DispatchError;
use crate::tools::registry::ToolRegistry;

/// A named call with its raw arguments, consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: J,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: J) -> Self {
        Self { name: name.into(), arguments }
    }
}

/// Routes calls to registered tools. Cheap to clone; the registry is shared read-only.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry: Arc::new(registry) }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn call(&self, req: ToolCallRequest) -> Result<CallToolResult, DispatchError> {
        let start = Instant::now();
        let name = req.name;
        let out = self.dispatch(&name, req.arguments).await;
        let (tool, outcome) = metric_labels(&name, &out);
        metrics::counter!("mcp_tool_calls_total", "tool" => tool, "outcome" => outcome).increment(1);
        match &out {
            Ok(_) => tracing::debug!(tool = %name, elapsed_us = start.elapsed().as_micros() as u64, "tool call ok"),
            Err(e) => tracing::warn!(tool = %name, error = %e, "tool call failed"),
        }
        out
    }

    async fn dispatch(&self, name: &str, arguments: J) -> Result<CallToolResult, DispatchError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| DispatchError::NotFound(name.to_owned()))?;
        tool.input_schema()
            .validate(&arguments)
            .map_err(|reason| DispatchError::InvalidArguments { tool: name.to_owned(), reason })?;
        tool.call(arguments)
            .await
            .map_err(|e| DispatchError::from_tool(name, e))
    }
}

/// Counter labels for one call. Unregistered names share the `unknown` label
/// so callers cannot grow the series set.
fn metric_labels(name: &str, out: &Result<CallToolResult, DispatchError>) -> (String, &'static str) {
    match out {
        Ok(_) => (name.to_owned(), "ok"),
        Err(DispatchError::NotFound(_)) => ("unknown".to_owned(), "not_found"),
        Err(DispatchError::InvalidArguments { .. }) => (name.to_owned(), "invalid_arguments"),
        Err(DispatchError::Execution { .. }) => (name.to_owned(), "execution_error"),
    }
}
