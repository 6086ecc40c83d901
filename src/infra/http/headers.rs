use axum::http::HeaderMap;
use reqwest::RequestBuilder;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generate a simple request id suitable for logging/correlation.
pub fn generate_request_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("mcp-{}-{}-{seq}", now.as_secs(), now.subsec_nanos())
}

/// Reuse the caller's request id when it sent one.
pub fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_owned)
        .unwrap_or_else(generate_request_id)
}

pub fn user_agent() -> String {
    format!("stateless-mcp-gateway/{}", env!("CARGO_PKG_VERSION"))
}

/// Add standard headers to an outgoing request. Returns the updated builder and the request id used.
pub fn add_standard_headers(
    builder: RequestBuilder,
    request_id: Option<String>,
) -> (RequestBuilder, String) {
    let rid = request_id.unwrap_or_else(generate_request_id);
    let b = builder
        .header(REQUEST_ID_HEADER, rid.as_str())
        .header(reqwest::header::USER_AGENT, user_agent());
    (b, rid)
}

/// Default headers for a client whose requests are built elsewhere (the MCP
/// client transport). Every request of that client shares `request_id`.
pub fn standard_headers(request_id: &str) -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Ok(v) = reqwest::header::HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, v);
    }
    if let Ok(v) = reqwest::header::HeaderValue::from_str(&user_agent()) {
        headers.insert(reqwest::header::USER_AGENT, v);
    }
    headers
}
