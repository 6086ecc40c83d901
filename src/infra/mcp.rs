//! MCP server handler for the gateway.
//!
//! Registered tools are mounted on an `rmcp` tool router, one dynamic route
//! per descriptor. Every route funnels into the [`Dispatcher`], so argument
//! checks, metrics and error kinds stay in one place.

use std::sync::Arc;

use futures::FutureExt;
use rmcp::handler::server::tool::{ToolCallContext, ToolRoute, ToolRouter};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, InitializeRequestParam, InitializeResult, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, ToolsCapability,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use serde_json::Value as J;

use crate::api::context::AppContext;
use crate::core::mcp::{negotiate_protocol_version, protocol_version_str};
use crate::core::tool::ToolDescriptor;
use crate::tools::dispatcher::{Dispatcher, ToolCallRequest};

#[derive(Clone)]
pub struct GatewaySvc {
    ctx: AppContext,
    tool_router: Arc<ToolRouter<GatewaySvc>>,
}

impl GatewaySvc {
    pub fn new(ctx: AppContext) -> Self {
        let tool_router = Arc::new(Self::router(&ctx.dispatcher));
        Self { ctx, tool_router }
    }

    pub fn router(dispatcher: &Dispatcher) -> ToolRouter<GatewaySvc> {
        dispatcher
            .registry()
            .list()
            .into_iter()
            .fold(ToolRouter::new(), |router, descriptor| {
                router.with_route(dispatch_route(descriptor, dispatcher.clone()))
            })
    }

    async fn dispatch(&self, request: CallToolRequestParam) -> Result<CallToolResult, ErrorData> {
        let call = ToolCallRequest::new(request.name.to_string(), arguments_value(request.arguments));
        self.ctx.dispatcher.call(call).await.map_err(|e| e.to_error_data())
    }
}

fn arguments_value(arguments: Option<rmcp::model::JsonObject>) -> J {
    arguments.map(J::Object).unwrap_or(J::Null)
}

fn dispatch_route(descriptor: ToolDescriptor, dispatcher: Dispatcher) -> ToolRoute<GatewaySvc> {
    let name = descriptor.name.to_string();
    ToolRoute::new_dyn(descriptor, move |ctx: ToolCallContext<'_, GatewaySvc>| {
        let call = ToolCallRequest::new(name.clone(), arguments_value(ctx.arguments.clone()));
        let dispatcher = dispatcher.clone();
        async move { dispatcher.call(call).await.map_err(|e| e.to_error_data()) }.boxed()
    })
}

impl ServerHandler for GatewaySvc {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: Some(false) }),
                ..Default::default()
            },
            server_info: self.ctx.server_info.clone(),
            instructions: self.ctx.instructions.clone(),
            ..Default::default()
        }
    }

    async fn initialize(
        &self,
        request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, ErrorData> {
        let mut info = self.get_info();
        info.protocol_version = negotiate_protocol_version(&request.protocol_version);
        tracing::info!(
            client = %request.client_info.name,
            client_version = %request.client_info.version,
            requested = %protocol_version_str(&request.protocol_version),
            answered = %protocol_version_str(&info.protocol_version),
            "initialize"
        );
        Ok(info)
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.ctx.dispatcher.registry().list(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        // unknown names go straight to the dispatcher for its NotFound shape
        if self.ctx.dispatcher.registry().describe(&request.name).is_none() {
            return self.dispatch(request).await;
        }
        let tcc = ToolCallContext::new(self, request, context);
        self.tool_router.call(tcc).await
    }
}
