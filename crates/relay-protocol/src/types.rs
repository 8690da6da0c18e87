use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol versions this gateway accepts on `initialize`, matching the
/// teacher's `streamable_http_v2.rs` `MCP-Protocol-Version` header check.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

pub fn is_supported_protocol_version(v: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&v)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Deliberately minimal: the core treats the MCP tool/resource/prompt
/// catalog as an opaque handler (spec.md §1 Out-of-scope); this crate only
/// needs enough of `initialize`'s shape to find `protocolVersion` and
/// surface a session-establishing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: Value,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

impl InitializeResult {
    pub fn new(protocol_version: impl Into<String>, server_name: &str, server_version: &str) -> Self {
        Self {
            protocol_version: protocol_version.into(),
            capabilities: serde_json::json!({}),
            server_info: ServerInfo {
                name: server_name.to_string(),
                version: server_version.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_protocol_version() {
        assert!(!is_supported_protocol_version("1999-01-01"));
        assert!(is_supported_protocol_version("2024-11-05"));
    }
}
