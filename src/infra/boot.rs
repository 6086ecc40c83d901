use std::net::SocketAddr;

use crate::api::context::{AppContext, ResponseMode};
use crate::infra::config::ServerConfig;
use crate::tools::registry::{build_registry, RegistryError};

pub fn app_context(cfg: &ServerConfig) -> Result<AppContext, RegistryError> {
    Ok(AppContext::new(build_registry()?, ResponseMode::from_json_flag(cfg.json_response)))
}

/// Bind `0.0.0.0:port` and serve until Ctrl-C.
pub async fn run_server(cfg: ServerConfig) -> anyhow::Result<()> {
    let ctx = app_context(&cfg)?;
    tracing::info!(
        port = cfg.port,
        json_response = cfg.json_response,
        tools = ctx.dispatcher.registry().len(),
        "BOOT stateless-mcp-gateway"
    );

    let app = crate::infra::http_app::build_app(ctx);
    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "MCP Streamable HTTP server listening on /mcp");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        return;
    }
    tracing::info!("shutdown requested");
}
