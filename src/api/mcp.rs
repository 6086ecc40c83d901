//! Front layer of the stateless `/mcp` endpoint.
//!
//! Every POST carries one JSON-RPC message. This layer checks content
//! negotiation and the envelope, answers notifications and unknown methods
//! itself, and forwards served requests to the `rmcp` streamable HTTP service.
//! In JSON mode the service's one-event stream is unwrapped into a plain
//! `application/json` body.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value as J};
use tracing::Instrument;

use crate::api::context::{AppContext, ResponseMode};
use crate::core::mcp::{codes, methods, JSONRPC_VERSION};
use crate::infra::http::headers::request_id_from;
use crate::infra::http::{json as http_json, sse};

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// What the forwarded request asks the service for.
const FORWARD_ACCEPT: &str = "application/json, text/event-stream";

/// Whether the client's `Accept` header admits what `mode` will send back.
/// A missing header counts as `*/*`.
pub fn accepts(headers: &HeaderMap, mode: ResponseMode) -> bool {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("*/*");
    let types: Vec<&str> = accept
        .split(',')
        .map(|p| p.split(';').next().unwrap_or_default().trim())
        .collect();
    let any = types.contains(&"*/*");
    let json = any || types.iter().any(|t| *t == "application/json" || *t == "application/*");
    let stream = any || types.iter().any(|t| *t == "text/event-stream" || *t == "text/*");
    match mode {
        ResponseMode::Json => json,
        ResponseMode::Sse => json && stream,
    }
}

#[derive(Debug, PartialEq)]
enum Envelope {
    Request { id: J, method: String },
    Notification { method: String },
    /// A response or error sent by the client; nothing waits for it here.
    Reply,
}

/// An error answer produced before the request reaches the service.
#[derive(Debug)]
struct Rejection {
    status: StatusCode,
    body: J,
}

impl Rejection {
    fn bad_request(id: J, code: i32, message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, body: http_json::error(id, code, message) }
    }

    fn invalid_params(id: J, message: impl Into<String>) -> Self {
        Self { status: StatusCode::OK, body: http_json::error(id, codes::INVALID_PARAMS, message) }
    }

    fn into_response(self, mode: ResponseMode) -> Response {
        if self.status == StatusCode::OK {
            encode(mode, self.body)
        } else {
            http_json::reject(self.status, self.body)
        }
    }
}

fn classify(body: &[u8]) -> Result<Envelope, Rejection> {
    let value: J = serde_json::from_slice(body)
        .map_err(|e| Rejection::bad_request(J::Null, codes::PARSE_ERROR, format!("parse error: {e}")))?;
    let J::Object(obj) = value else {
        return Err(Rejection::bad_request(J::Null, codes::INVALID_REQUEST, "request must be a single JSON object"));
    };
    let id = match obj.get("id") {
        None => None,
        Some(id @ (J::String(_) | J::Number(_))) => Some(id.clone()),
        Some(_) => {
            return Err(Rejection::bad_request(J::Null, codes::INVALID_REQUEST, "id must be a string or a number"))
        }
    };
    let reply_id = id.clone().unwrap_or(J::Null);
    if obj.get("jsonrpc").and_then(J::as_str) != Some(JSONRPC_VERSION) {
        return Err(Rejection::bad_request(reply_id, codes::INVALID_REQUEST, "jsonrpc must be \"2.0\""));
    }
    let method = match obj.get("method") {
        Some(J::String(m)) => m.clone(),
        Some(_) => return Err(Rejection::bad_request(reply_id, codes::INVALID_REQUEST, "method must be a string")),
        None if id.is_some() && (obj.contains_key("result") || obj.contains_key("error")) => {
            return Ok(Envelope::Reply)
        }
        None => return Err(Rejection::bad_request(reply_id, codes::INVALID_REQUEST, "missing method")),
    };
    let params = match obj.get("params") {
        None | Some(J::Null) => None,
        Some(J::Object(p)) => Some(p),
        Some(_) => return Err(Rejection::bad_request(reply_id, codes::INVALID_REQUEST, "params must be an object")),
    };
    let Some(id) = id else {
        return Ok(Envelope::Notification { method });
    };
    check_params(&method, params).map_err(|reason| Rejection::invalid_params(id.clone(), reason))?;
    Ok(Envelope::Request { id, method })
}

/// Shape checks for the params of served methods, so malformed calls get a
/// JSON-RPC error instead of a transport failure.
fn check_params(method: &str, params: Option<&Map<String, J>>) -> Result<(), String> {
    let empty = Map::new();
    let params = params.unwrap_or(&empty);
    match method {
        methods::TOOLS_CALL => {
            if !params.get("name").is_some_and(J::is_string) {
                return Err("invalid tools/call params: `name` must be a string".into());
            }
            match params.get("arguments") {
                None | Some(J::Null) | Some(J::Object(_)) => Ok(()),
                Some(_) => Err("invalid tools/call params: `arguments` must be an object".into()),
            }
        }
        methods::INITIALIZE => {
            let info = params.get("clientInfo");
            let named = |key: &str| info.and_then(|i| i.get(key)).is_some_and(J::is_string);
            if !params.get("protocolVersion").is_some_and(J::is_string) {
                return Err("invalid initialize params: `protocolVersion` must be a string".into());
            }
            if !(named("name") && named("version")) {
                return Err("invalid initialize params: `clientInfo` needs `name` and `version`".into());
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn encode(mode: ResponseMode, body: J) -> Response {
    match mode {
        ResponseMode::Json => Json(body).into_response(),
        ResponseMode::Sse => sse::single_message(&body).into_response(),
    }
}

/// Middleware in front of the MCP service on `POST /mcp`.
pub async fn guard(State(ctx): State<AppContext>, request: Request, next: Next) -> Response {
    let request_id = request_id_from(request.headers());
    let span = tracing::info_span!("mcp_request", request_id = %request_id);
    admit(ctx.response_mode, request, next).instrument(span).await
}

async fn admit(mode: ResponseMode, request: Request, next: Next) -> Response {
    if !accepts(request.headers(), mode) {
        tracing::warn!(mode = ?mode, "rejecting request: unacceptable Accept header");
        let body = http_json::error(
            J::Null,
            codes::INVALID_REQUEST,
            "Not Acceptable: client must accept the response content type",
        );
        return http_json::reject(StatusCode::NOT_ACCEPTABLE, body);
    }
    let (mut parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable request body");
            let body = http_json::error(J::Null, codes::INVALID_REQUEST, format!("unreadable body: {e}"));
            return http_json::reject(StatusCode::PAYLOAD_TOO_LARGE, body);
        }
    };
    let (id, method) = match classify(&bytes) {
        Ok(Envelope::Request { id, method }) => (id, method),
        Ok(Envelope::Notification { method }) => {
            tracing::debug!(%method, "notification accepted");
            return StatusCode::ACCEPTED.into_response();
        }
        Ok(Envelope::Reply) => {
            tracing::debug!("client reply accepted");
            return StatusCode::ACCEPTED.into_response();
        }
        Err(rejection) => {
            tracing::warn!(status = %rejection.status, error = %rejection.body["error"]["message"], "request rejected");
            return rejection.into_response(mode);
        }
    };
    if !methods::is_served(&method) {
        let body = http_json::error(id, codes::METHOD_NOT_FOUND, format!("unknown method: {method}"));
        return encode(mode, body);
    }

    tracing::debug!(%method, id = %id, "forwarding to MCP service");
    parts.headers.insert(header::ACCEPT, HeaderValue::from_static(FORWARD_ACCEPT));
    parts.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let response = next.run(Request::from_parts(parts, Body::from(bytes))).await;
    match mode {
        ResponseMode::Sse => response,
        ResponseMode::Json => unwrap_stream(response, &id).await,
    }
}

/// Turn the service's event-stream answer into one JSON body.
async fn unwrap_stream(response: Response, id: &J) -> Response {
    let is_stream = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(sse::is_event_stream_content_type);
    if !response.status().is_success() || !is_stream {
        return response;
    }
    match sse::first_response(response.into_body().into_data_stream(), id).await {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "MCP service gave no response");
            let body = http_json::error(id.clone(), codes::INTERNAL_ERROR, e);
            http_json::reject(StatusCode::INTERNAL_SERVER_ERROR, body)
        }
    }
}
