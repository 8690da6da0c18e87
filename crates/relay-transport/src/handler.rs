//! A minimal `McpHandler` sufficient to answer `initialize` and return
//! empty catalogs for everything else. The real tool/resource/prompt
//! catalog is out of scope for this core (spec.md §1) and is expected to
//! be swapped in by whatever embeds this gateway; this stands in so the
//! gateway binary has something to serve end to end.

use async_trait::async_trait;
use relay_protocol::{Frame, InitializeResult, JsonRpcError, RequestId, codes};

use crate::core::McpHandler;

pub struct MinimalMcpHandler {
    server_name: String,
    server_version: String,
}

impl MinimalMcpHandler {
    pub fn new(server_name: impl Into<String>, server_version: impl Into<String>) -> Self {
        Self { server_name: server_name.into(), server_version: server_version.into() }
    }
}

#[async_trait]
impl McpHandler for MinimalMcpHandler {
    async fn handle(&self, request: Frame) -> Frame {
        let id = match &request.id {
            Some(id) => id.clone(),
            None => return Frame::failure(None, JsonRpcError::internal("notification has no reply")),
        };

        match request.method.as_deref() {
            Some("initialize") => {
                let protocol_version = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("2024-11-05")
                    .to_string();
                let result = InitializeResult::new(protocol_version, &self.server_name, &self.server_version);
                Frame::success(id, serde_json::to_value(result).unwrap())
            }
            Some("tools/list") => Frame::success(id, serde_json::json!({"tools": []})),
            Some("resources/list") => Frame::success(id, serde_json::json!({"resources": []})),
            Some("prompts/list") => Frame::success(id, serde_json::json!({"prompts": []})),
            Some(other) => Frame::failure(
                Some(id),
                JsonRpcError::new(codes::METHOD_NOT_FOUND, format!("unknown method: {other}")),
            ),
            None => Frame::failure(Some(id), JsonRpcError::new(codes::INVALID_REQUEST, "missing method")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_initialize() {
        let handler = MinimalMcpHandler::new("relay-gateway", "0.1.0");
        let req = Frame::request(
            RequestId::Number(1),
            "initialize",
            Some(serde_json::json!({"protocolVersion": "2024-11-05", "capabilities": {}, "clientInfo": {"name": "c", "version": "1"}})),
        );
        let resp = handler.handle(req).await;
        assert!(resp.error.is_none());
        assert_eq!(resp.id, Some(RequestId::Number(1)));
    }
}
