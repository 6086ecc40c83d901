//! Adapters that put local and remote tools behind the same [`ToolBackend`] seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as J;

use crate::clients::session::ClientSession;
use crate::core::error::McpError;
use crate::core::tool::{InputSchema, ResultMode, ToolBackend, ToolDescriptor, ToolOutput};
use crate::tools::dispatcher::{Dispatcher, ToolCallRequest};

/// A tool living on an MCP server, called through a shared session. The
/// advertised schema is kept verbatim; only its typed view is checked here.
pub struct RemoteTool {
    descriptor: ToolDescriptor,
    schema: InputSchema,
    session: Arc<ClientSession>,
    mode: ResultMode,
}

impl RemoteTool {
    pub fn new(descriptor: ToolDescriptor, session: Arc<ClientSession>, mode: ResultMode) -> Self {
        let schema = InputSchema::of(&descriptor);
        Self { descriptor, schema, session, mode }
    }
}

#[async_trait]
impl ToolBackend for RemoteTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, arguments: J) -> Result<ToolOutput, McpError> {
        let name: &str = &self.descriptor.name;
        // Fail fast on arguments the server would reject anyway.
        self.schema
            .validate(&arguments)
            .map_err(|reason| McpError::InvalidArguments { tool: name.to_owned(), reason })?;
        let result = self.session.call_tool(name, arguments).await?;
        Ok(ToolOutput::from_result(result, self.mode))
    }
}

/// Discover the server's tools and wrap each one as a [`RemoteTool`].
pub async fn load_remote_tools(
    session: Arc<ClientSession>,
    mode: ResultMode,
) -> Result<Vec<Arc<dyn ToolBackend>>, McpError> {
    let descriptors = session.list_tools().await?;
    tracing::info!(count = descriptors.len(), "loaded remote tools");
    Ok(descriptors
        .into_iter()
        .map(|d| Arc::new(RemoteTool::new(d, session.clone(), mode)) as Arc<dyn ToolBackend>)
        .collect())
}

/// An in-process tool, reached through the dispatcher without any transport.
pub struct LocalTool {
    descriptor: ToolDescriptor,
    dispatcher: Dispatcher,
    mode: ResultMode,
}

impl LocalTool {
    pub fn new(descriptor: ToolDescriptor, dispatcher: Dispatcher, mode: ResultMode) -> Self {
        Self { descriptor, dispatcher, mode }
    }
}

#[async_trait]
impl ToolBackend for LocalTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, arguments: J) -> Result<ToolOutput, McpError> {
        let req = ToolCallRequest::new(self.descriptor.name.to_string(), arguments);
        let result = self.dispatcher.call(req).await?;
        Ok(ToolOutput::from_result(result, self.mode))
    }
}

/// Every tool in the dispatcher's registry as a local backend.
pub fn local_tools(dispatcher: &Dispatcher, mode: ResultMode) -> Vec<Arc<dyn ToolBackend>> {
    dispatcher
        .registry()
        .list()
        .into_iter()
        .map(|d| Arc::new(LocalTool::new(d, dispatcher.clone(), mode)) as Arc<dyn ToolBackend>)
        .collect()
}
