//! Protocol constants shared by the server front layer and the client, on top
//! of the `rmcp::model` wire types.

use rmcp::model::ProtocolVersion;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revisions this implementation speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[ProtocolVersion] = &[
    ProtocolVersion::LATEST,
    ProtocolVersion::V_2025_03_26,
    ProtocolVersion::V_2024_11_05,
];

pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";

    /// Request methods the gateway answers.
    pub const SERVED: &[&str] = &[INITIALIZE, PING, TOOLS_LIST, TOOLS_CALL];

    pub fn is_served(method: &str) -> bool {
        SERVED.contains(&method)
    }
}

pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Application error raised by a tool body.
    pub const EXECUTION_ERROR: i32 = -32000;
    pub const TOOL_NOT_FOUND: i32 = -32001;
}

/// Pick the revision to answer with: the client's if we speak it, else our newest.
pub fn negotiate_protocol_version(requested: &ProtocolVersion) -> ProtocolVersion {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| *v == requested)
        .cloned()
        .unwrap_or(ProtocolVersion::LATEST)
}

/// Wire spelling of a protocol revision, e.g. `2025-03-26`.
pub fn protocol_version_str(version: &ProtocolVersion) -> String {
    match serde_json::to_value(version) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(s: &str) -> ProtocolVersion {
        serde_json::from_value(serde_json::json!(s)).unwrap()
    }

    #[test]
    fn negotiates_known_and_unknown_versions() {
        assert_eq!(
            protocol_version_str(&negotiate_protocol_version(&version("2024-11-05"))),
            "2024-11-05"
        );
        assert_eq!(
            negotiate_protocol_version(&version("1999-01-01")),
            ProtocolVersion::LATEST
        );
    }

    #[test]
    fn served_methods_exclude_notifications() {
        assert!(methods::is_served("tools/call"));
        assert!(!methods::is_served(methods::INITIALIZED));
        assert!(!methods::is_served("resources/list"));
    }
}
