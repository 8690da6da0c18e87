use serde::{Deserialize, Serialize};

/// JSON-RPC 2.0 error codes used by the core, including the two
/// gateway-specific codes reserved for upstream-unavailable and internal
/// failures (spec.md §7).
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Reserved by this gateway for "authentication service unavailable"
    /// (degraded mode, spec.md §4.10, §7).
    pub const AUTH_SERVICE_UNAVAILABLE: i64 = -32000;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    pub fn auth_service_unavailable(hint: impl Into<String>) -> Self {
        Self::new(codes::AUTH_SERVICE_UNAVAILABLE, "Authentication service unavailable")
            .with_data(serde_json::json!({ "hint": hint.into() }))
    }
}

/// Errors surfaced by the protocol crate itself: framing and parsing only.
/// Everything that needs an HTTP status mapping lives one layer up, in
/// `relay-gateway::error`, which wraps these with request context per
/// spec.md §7's propagation rule.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed JSON-RPC frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame is not a request (missing method)")]
    NotARequest,

    #[error("unsupported MCP protocol version: {0}")]
    UnsupportedProtocolVersion(String),
}
