//! The polymorphic transport interface spec.md §9 calls for: "a `Transport`
//! with operations `{start, send, close, onMessage, onError, onClose}`" so
//! that `ServerTransport` (C6) and `RelayTransport` (C7) can be swapped
//! behind the MCP handler without it knowing which one it's talking to.
//!
//! Rust has no duck typing, so the callback-shaped original becomes a
//! trait plus a `Frame` stream, per the same design note's second half:
//! "Callback-based SSE subscription APIs are replaced by a lazy sequence
//! of frames... consumed by a dedicated task per subscription."

use async_trait::async_trait;
use relay_protocol::Frame;

use crate::error::TransportError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Begins whatever background work the transport needs (subscriptions,
    /// timers). Idempotent only in the sense that it is called exactly
    /// once per transport instance.
    async fn start(&mut self) -> Result<(), TransportError>;

    /// Sends a single frame out through this transport.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Tears the transport down: unsubscribes, cancels timers. Safe to
    /// call more than once.
    async fn close(&mut self);

    /// Pulls the next inbound frame, or `None` once the transport is
    /// closed and will produce no more.
    async fn recv(&mut self) -> Option<Frame>;
}

/// The MCP tool/resource/prompt catalog is out of scope for this core
/// (spec.md §1): "the core treats the MCP protocol handler as an opaque
/// object accepting a framed transport." This trait is that object's
/// shape — request frames in, response frames out — so C6/C8/C9 can be
/// built and tested against it without depending on a concrete catalog.
#[async_trait]
pub trait McpHandler: Send + Sync {
    async fn handle(&self, request: Frame) -> Frame;
}
