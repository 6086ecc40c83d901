use axum::{
    middleware,
    routing::{get, post_service},
    Json, Router,
};
use serde_json::json;

use crate::api::context::AppContext;
use crate::infra::runtime::mcp_transport::make_streamable_http_service;

/// Stateless app: capability summary at `/`, `/healthz`, and the MCP endpoint
/// at `/mcp`. Only POST is routed on `/mcp`, so GET/DELETE get 405.
pub fn build_app(ctx: AppContext) -> Router {
    let mcp_service = make_streamable_http_service(ctx.clone());
    Router::new()
        .route(
            "/",
            get(|| async {
                Json(json!({
                    "message": "MCP Streamable HTTP Stateless API",
                    "endpoints": { "mcp": "/mcp" }
                }))
            }),
        )
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/mcp",
            post_service(mcp_service).route_layer(middleware::from_fn_with_state(ctx, crate::api::mcp::guard)),
        )
}
