//! Streamable HTTP service factory for the gateway handler.

use std::sync::Arc;

use rmcp::transport::streamable_http_server::tower::{StreamableHttpServerConfig, StreamableHttpService};

pub use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;

use crate::api::context::AppContext;
use crate::infra::mcp::GatewaySvc;

/// No session ids and no keep-alive pings: every POST is answered on its own
/// and the response stream closes after the reply.
pub fn stateless_config() -> StreamableHttpServerConfig {
    StreamableHttpServerConfig {
        stateful_mode: false,
        sse_keep_alive: None,
        ..Default::default()
    }
}

pub fn make_streamable_http_service(ctx: AppContext) -> StreamableHttpService<GatewaySvc, LocalSessionManager> {
    let svc = GatewaySvc::new(ctx);
    let cfg = stateless_config();
    tracing::debug!(stateful_mode = cfg.stateful_mode, "StreamableHttpServerConfig");
    StreamableHttpService::new(move || Ok(svc.clone()), Arc::new(LocalSessionManager::default()), cfg)
}
