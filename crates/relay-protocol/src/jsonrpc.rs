use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JsonRpcError, ProtocolError};

/// A JSON-RPC 2.0 request id: either a number or a string, never null once
/// present (absence of the field means the frame is a notification).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// One JSON-RPC 2.0 frame, in any of its three shapes. Deserializing a raw
/// `serde_json::Value` into this type is how `RelayTransport` (C7)
/// distinguishes requests (have `id` + `method`), notifications (have
/// `method`, no `id`), and responses (have `id`, no `method`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub jsonrpc: JsonRpcVersion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// The literal `"jsonrpc": "2.0"` field, represented as a unit type so it
/// can never deserialize to anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == "2.0" {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!("unsupported jsonrpc version: {s}")))
        }
    }
}

impl Frame {
    /// A request carries both `method` and `id`.
    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }

    /// A notification carries `method` but no `id`; it never elicits a
    /// reply (spec.md §6).
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    /// A response carries `id` but no `method`.
    pub fn is_response(&self) -> bool {
        self.method.is_none() && self.id.is_some()
    }

    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: Some(id),
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: None,
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    pub fn method_name(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::Malformed)
    }

    pub fn to_json_string(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_and_classifies() {
        let f = Frame::request(
            RequestId::Number(1),
            "initialize",
            Some(serde_json::json!({"protocolVersion": "2024-11-05"})),
        );
        assert!(f.is_request());
        assert!(!f.is_notification());
        let raw = f.to_json_string().unwrap();
        let parsed = Frame::parse(&raw).unwrap();
        assert_eq!(parsed.id, Some(RequestId::Number(1)));
        assert_eq!(parsed.method.as_deref(), Some("initialize"));
    }

    #[test]
    fn notification_has_no_id() {
        let f = Frame::notification("notifications/progress", None);
        assert!(f.is_notification());
        assert!(!f.is_request());
        assert!(f.id.is_none());
    }

    #[test]
    fn response_classifies_correctly() {
        let f = Frame::success(RequestId::String("r1".into()), serde_json::json!({"ok": true}));
        assert!(f.is_response());
        assert!(!f.is_request());
    }
}
