use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value as J};

use crate::core::mcp::{codes, JSONRPC_VERSION};

/// JSON-RPC error envelope. `id` is `null` when the request id is unknown.
pub fn error(id: J, code: i32, message: impl Into<String>) -> J {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": { "code": code, "message": message.into() }
    })
}

pub fn parse_error(message: impl Into<String>) -> J {
    error(J::Null, codes::PARSE_ERROR, message)
}

/// An error envelope sent with a non-200 status.
pub fn reject(status: StatusCode, body: J) -> Response {
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn wraps_error_response_in_json_rpc_envelope() {
        let v = error(json!(3), codes::METHOD_NOT_FOUND, "method not found");
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["id"], 3);
        assert!(v.get("result").is_none());
        assert_eq!(v["error"]["code"], -32601);
    }

    #[test]
    fn builds_parse_error_with_standard_code() {
        let v = parse_error("bad json");
        assert_eq!(v["id"], J::Null);
        assert_eq!(v["error"]["code"], -32700);
        assert!(v["error"]["message"].as_str().unwrap().contains("bad json"));
    }

    #[tokio::test]
    async fn rejections_keep_status_and_body() {
        let resp = reject(StatusCode::BAD_REQUEST, error(J::Null, codes::INVALID_REQUEST, "nope"));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let v: J = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["error"]["code"], codes::INVALID_REQUEST);
    }
}
