use rmcp::model::Implementation;

use crate::tools::dispatcher::Dispatcher;
use crate::tools::registry::ToolRegistry;

pub const SERVER_NAME: &str = "mcp-streamable-http-stateless-demo";

/// How `/mcp` encodes its single response per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseMode {
    /// One buffered `application/json` body.
    Json,
    /// A `text/event-stream` carrying one `message` event.
    #[default]
    Sse,
}

impl ResponseMode {
    pub fn from_json_flag(json_response: bool) -> Self {
        if json_response {
            ResponseMode::Json
        } else {
            ResponseMode::Sse
        }
    }
}

/// Everything a request handler needs, built once at startup and cloned per
/// request. Nothing in here is mutable.
#[derive(Clone)]
pub struct AppContext {
    pub dispatcher: Dispatcher,
    pub server_info: Implementation,
    pub response_mode: ResponseMode,
    pub instructions: Option<String>,
}

impl AppContext {
    pub fn new(registry: ToolRegistry, response_mode: ResponseMode) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry),
            server_info: Implementation {
                name: SERVER_NAME.to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                ..Default::default()
            },
            response_mode,
            instructions: None,
        }
    }
}
