pub mod channels;
pub mod core;
pub mod error;
pub mod handler;
pub mod relay_transport;
pub mod server_transport;
pub mod session_directory;
pub mod sse_legacy;
pub mod streamable_http;

#[cfg(test)]
pub mod testing;

pub use core::{McpHandler, Transport};
pub use error::TransportError;
pub use handler::MinimalMcpHandler;
pub use relay_transport::RelayTransport;
pub use server_transport::{OutboundEnvelope, ServerTransport};
pub use session_directory::SessionDirectory;
pub use sse_legacy::SseLegacyState;
pub use streamable_http::StreamableHttpState;
