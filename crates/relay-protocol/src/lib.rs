//! JSON-RPC 2.0 framing and the minimal MCP `initialize` vocabulary shared
//! by every other crate in the relay gateway workspace.
//!
//! This crate intentionally knows nothing about sessions, transports, or
//! authorization; it is the wire layer those higher crates build on.

pub mod error;
pub mod jsonrpc;
pub mod types;

pub use error::{JsonRpcError, ProtocolError, codes};
pub use jsonrpc::{Frame, JsonRpcVersion, RequestId};
pub use types::{ClientInfo, InitializeParams, InitializeResult, ServerInfo, is_supported_protocol_version};
