//! Client side of a stateless MCP connection over the `rmcp` streamable HTTP
//! client transport, with the lifecycle (connect, initialize, use, close)
//! enforced locally.

use std::time::Duration;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientCapabilities, ClientInfo, ClientRequest, Implementation,
    InitializeResult, PingRequest, ProtocolVersion,
};
use rmcp::service::{Peer, RoleClient, RunningService, ServiceExt};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use serde_json::Value as J;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::core::content::{flatten_text, is_error};
use crate::core::error::McpError;
use crate::core::mcp::protocol_version_str;
use crate::core::tool::ToolDescriptor;
use crate::infra::http::headers::{generate_request_id, standard_headers};
use crate::infra::runtime::limits::make_http_client_with_headers;

/// Extra room on the HTTP client's own timeout so the session timeout fires first.
const HTTP_TIMEOUT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    /// Handshake done; holds the negotiated protocol revision.
    Initialized { protocol_version: String },
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub timeout: Duration,
    pub client_info: Implementation,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            client_info: Implementation {
                name: "stateless-mcp-gateway-client".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
        }
    }
}

struct Inner {
    state: SessionState,
    peer: Option<Peer<RoleClient>>,
}

pub struct ClientSession {
    endpoint: reqwest::Url,
    http: reqwest::Client,
    options: SessionOptions,
    inner: RwLock<Inner>,
    running: Mutex<Option<RunningService<RoleClient, ClientInfo>>>,
    cancel: CancellationToken,
}

impl ClientSession {
    /// Validate the endpoint and prepare the HTTP client. No request is sent.
    pub fn connect(endpoint: &str, options: SessionOptions) -> Result<Self, McpError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| McpError::Transport(format!("invalid endpoint `{endpoint}`: {e}")))?;
        let session_id = generate_request_id();
        let http = make_http_client_with_headers(options.timeout + HTTP_TIMEOUT_GRACE, standard_headers(&session_id))
            .map_err(|e| McpError::Transport(format!("http client: {e}")))?;
        tracing::debug!(%endpoint, request_id = %session_id, "MCP session connected");
        Ok(Self {
            endpoint,
            http,
            options,
            inner: RwLock::new(Inner { state: SessionState::Connected, peer: None }),
            running: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state.clone()
    }

    fn client_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ClientCapabilities::default(),
            client_info: self.options.client_info.clone(),
        }
    }

    /// Handshake, then `notifications/initialized`. Only valid once, from `Connected`.
    pub async fn initialize(&self) -> Result<InitializeResult, McpError> {
        // Held for the whole handshake so concurrent callers see the outcome.
        let mut inner = self.inner.write().await;
        match &inner.state {
            SessionState::Connected => {}
            SessionState::Initialized { .. } => {
                return Err(McpError::ProtocolOrder("session is already initialized".into()))
            }
            SessionState::Disconnected => return Err(closed()),
        }
        let config = StreamableHttpClientTransportConfig::with_uri(self.endpoint.as_str());
        let transport = StreamableHttpClientTransport::with_client(self.http.clone(), config);
        let client_info = self.client_info();
        let service = self
            .guarded(async move {
                client_info
                    .serve(transport)
                    .await
                    .map_err(|e| McpError::Transport(format!("initialize failed: {e}")))
            })
            .await?;
        let Some(result) = service.peer_info().cloned() else {
            return Err(McpError::Transport("server sent no initialize result".into()));
        };
        let protocol_version = protocol_version_str(&result.protocol_version);
        tracing::info!(
            server = %result.server_info.name,
            protocol_version = %protocol_version,
            "MCP session initialized"
        );
        inner.peer = Some(service.peer().clone());
        inner.state = SessionState::Initialized { protocol_version };
        *self.running.lock().await = Some(service);
        Ok(result)
    }

    pub async fn ping(&self) -> Result<(), McpError> {
        let peer = self.ready("ping").await?;
        self.guarded(async move {
            peer.send_request(ClientRequest::PingRequest(PingRequest::default()))
                .await
                .map(|_| ())
                .map_err(|e| McpError::from_service(e, None))
        })
        .await
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let peer = self.ready("tools/list").await?;
        self.guarded(async move {
            peer.list_tools(Default::default())
                .await
                .map(|result| result.tools)
                .map_err(|e| McpError::from_service(e, None))
        })
        .await
    }

    /// `tools/call`. A result flagged `isError` comes back as `Execution`.
    pub async fn call_tool(&self, name: &str, arguments: J) -> Result<CallToolResult, McpError> {
        let peer = self.ready("tools/call").await?;
        let arguments = match arguments {
            J::Object(map) => Some(map),
            J::Null => None,
            other => {
                return Err(McpError::InvalidArguments {
                    tool: name.to_owned(),
                    reason: format!("arguments must be an object, got {other}"),
                })
            }
        };
        let request = CallToolRequestParam { name: name.to_owned().into(), arguments };
        tracing::debug!(tool = name, "MCP tools/call");
        let result = self
            .guarded(async move { peer.call_tool(request).await.map_err(|e| McpError::from_service(e, Some(name))) })
            .await?;
        if is_error(&result) {
            return Err(McpError::Execution { tool: name.to_owned(), reason: flatten_text(&result.content) });
        }
        Ok(result)
    }

    /// Cancel everything in flight and refuse further calls.
    pub async fn close(&self) {
        self.cancel.cancel();
        {
            let mut inner = self.inner.write().await;
            inner.state = SessionState::Disconnected;
            inner.peer = None;
        }
        if let Some(service) = self.running.lock().await.take() {
            if let Err(e) = service.cancel().await {
                tracing::debug!(error = %e, "MCP client task ended abnormally");
            }
        }
        tracing::debug!(endpoint = %self.endpoint, "MCP session closed");
    }

    async fn ready(&self, method: &str) -> Result<Peer<RoleClient>, McpError> {
        if self.cancel.is_cancelled() {
            return Err(closed());
        }
        let inner = self.inner.read().await;
        match (&inner.state, &inner.peer) {
            (SessionState::Initialized { .. }, Some(peer)) => Ok(peer.clone()),
            (SessionState::Connected, _) => {
                Err(McpError::ProtocolOrder(format!("`{method}` sent before initialize")))
            }
            _ => Err(closed()),
        }
    }

    /// Race a request against close() and the per-request timeout.
    async fn guarded<T, F>(&self, fut: F) -> Result<T, McpError>
    where
        F: std::future::Future<Output = Result<T, McpError>>,
    {
        let timeout = self.options.timeout;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(closed()),
            out = tokio::time::timeout(timeout, fut) => match out {
                Ok(r) => r,
                Err(_) => Err(McpError::Cancelled(format!("no response within {timeout:?}"))),
            },
        }
    }
}

fn closed() -> McpError {
    McpError::Cancelled("session closed".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use httpmock::prelude::*;
    use rmcp::model::Content;
    use serde_json::json;

    use crate::api::context::{AppContext, ResponseMode, SERVER_NAME};
    use crate::core::error::ToolError;
    use crate::core::tool::{InputSchema, Tool, ToolSpec, TypedTool};
    use crate::infra::http_app::build_app;
    use crate::tools::registry::{build_registry, ToolRegistry};

    struct Slow;

    impl ToolSpec for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn description(&self) -> &'static str {
            "sleeps"
        }
        fn input_schema(&self) -> InputSchema {
            InputSchema::object()
        }
    }

    #[async_trait]
    impl TypedTool for Slow {
        type Args = J;
        async fn run(&self, _args: J) -> Result<CallToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(crate::core::content::text_result("late"))
        }
    }

    struct Flagged;

    impl ToolSpec for Flagged {
        fn name(&self) -> &'static str {
            "explode"
        }
        fn description(&self) -> &'static str {
            "reports failure in its result"
        }
        fn input_schema(&self) -> InputSchema {
            InputSchema::object()
        }
    }

    #[async_trait]
    impl TypedTool for Flagged {
        type Args = J;
        async fn run(&self, _args: J) -> Result<CallToolResult, ToolError> {
            Ok(CallToolResult::error(vec![Content::text("boom")]))
        }
    }

    async fn spawn(registry: ToolRegistry, mode: ResponseMode) -> String {
        let app = build_app(AppContext::new(registry, mode));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/mcp")
    }

    async fn live_session(registry: ToolRegistry, mode: ResponseMode) -> ClientSession {
        let url = spawn(registry, mode).await;
        let s = ClientSession::connect(&url, SessionOptions::default()).unwrap();
        s.initialize().await.unwrap();
        s
    }

    fn test_tools() -> ToolRegistry {
        ToolRegistry::with_tools([Arc::new(Slow) as Arc<dyn Tool>, Arc::new(Flagged) as Arc<dyn Tool>]).unwrap()
    }

    #[tokio::test]
    async fn calls_before_initialize_are_rejected_without_network() {
        let server = MockServer::start_async().await;
        let any = server
            .mock_async(|when, then| {
                when.method(POST).path("/mcp");
                then.status(200).json_body(json!({}));
            })
            .await;
        let s = ClientSession::connect(&server.url("/mcp"), SessionOptions::default()).unwrap();
        assert_eq!(s.state().await, SessionState::Connected);
        assert!(matches!(s.list_tools().await, Err(McpError::ProtocolOrder(_))));
        assert!(matches!(
            s.call_tool("add", json!({"a":3,"b":5})).await,
            Err(McpError::ProtocolOrder(_))
        ));
        assert!(matches!(s.ping().await, Err(McpError::ProtocolOrder(_))));
        assert_eq!(any.hits_async().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn initialize_negotiates_once() {
        let url = spawn(build_registry().unwrap(), ResponseMode::Json).await;
        let s = ClientSession::connect(&url, SessionOptions::default()).unwrap();
        let result = s.initialize().await.unwrap();
        assert_eq!(result.server_info.name, SERVER_NAME);
        let expected = protocol_version_str(&ProtocolVersion::default());
        assert_eq!(s.state().await, SessionState::Initialized { protocol_version: expected });
        assert!(matches!(s.initialize().await, Err(McpError::ProtocolOrder(_))));
        s.ping().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn both_response_modes_answer_calls() {
        for mode in [ResponseMode::Json, ResponseMode::Sse] {
            let s = live_session(build_registry().unwrap(), mode).await;
            let out = s.call_tool("add", json!({"a":3,"b":5})).await.unwrap();
            assert_eq!(flatten_text(&out.content), "8", "{mode:?}");
            let names: Vec<String> = s.list_tools().await.unwrap().into_iter().map(|t| t.name.to_string()).collect();
            assert_eq!(names, vec!["add", "multiply"]);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rpc_errors_map_back_to_typed_errors() {
        let s = live_session(build_registry().unwrap(), ResponseMode::Sse).await;
        let err = s.call_tool("divide", json!({"a":1,"b":2})).await.unwrap_err();
        assert_eq!(err, McpError::NotFound("divide".into()));
        let err = s.call_tool("add", json!({"a":1})).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments { ref tool, .. } if tool == "add"), "{err:?}");
        let err = s.call_tool("add", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flagged_results_are_execution_errors() {
        let s = live_session(test_tools(), ResponseMode::Json).await;
        let err = s.call_tool("explode", json!({})).await.unwrap_err();
        assert_eq!(err, McpError::Execution { tool: "explode".into(), reason: "boom".into() });
    }

    #[tokio::test]
    async fn server_errors_are_transient_transport_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/mcp");
                then.status(503).body("unavailable");
            })
            .await;
        let s = ClientSession::connect(&server.url("/mcp"), SessionOptions::default()).unwrap();
        let err = s.initialize().await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
        assert_eq!(s.state().await, SessionState::Connected);
    }

    #[tokio::test]
    async fn slow_responses_time_out_as_cancelled() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/mcp");
                then.status(200).delay(Duration::from_millis(500)).json_body(json!({}));
            })
            .await;
        let opts = SessionOptions { timeout: Duration::from_millis(50), ..SessionOptions::default() };
        let s = ClientSession::connect(&server.url("/mcp"), opts).unwrap();
        assert!(matches!(s.initialize().await, Err(McpError::Cancelled(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_cancels_in_flight_calls() {
        let s = Arc::new(live_session(test_tools(), ResponseMode::Sse).await);
        let pending = {
            let s = s.clone();
            tokio::spawn(async move { s.call_tool("slow", json!({})).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        s.close().await;
        let out = pending.await.unwrap();
        assert!(matches!(out, Err(McpError::Cancelled(_))), "{out:?}");
        assert_eq!(s.state().await, SessionState::Disconnected);
        assert!(matches!(s.list_tools().await, Err(McpError::Cancelled(_))));
        assert!(matches!(s.initialize().await, Err(McpError::Cancelled(_))));
    }

    #[test]
    fn rejects_invalid_endpoints() {
        assert!(matches!(
            ClientSession::connect("not a url", SessionOptions::default()),
            Err(McpError::Transport(_))
        ));
    }
}
