//! C7 — `RelayTransport`. One per HTTP request or stream; bridges HTTP
//! semantics onto the shared-store channels `ServerTransport` listens on.

use std::sync::Arc;

use relay_auth::SharedStore;
use relay_protocol::{Frame, RequestId};
use tokio::sync::mpsc;

use crate::channels;
use crate::error::TransportError;
use crate::server_transport::OutboundEnvelope;

pub struct RelayTransport<S: SharedStore> {
    store: Arc<S>,
    session_id: String,
}

impl<S: SharedStore> RelayTransport<S> {
    pub fn new(store: Arc<S>, session_id: impl Into<String>) -> Self {
        Self { store, session_id: session_id.into() }
    }

    /// One POST request carrying a client-to-server frame with an `id`.
    /// Subscribes to the reply channel *before* publishing the inbound
    /// frame (spec.md §4.7, §5) so a fast reply on the owning replica can
    /// never be missed — a subscribe-then-publish happens-before
    /// relationship on the same connection this crate uses, not a
    /// request-scoped correlation token, because the chosen store
    /// (`redis`) gives per-channel FIFO-from-a-publisher but does not
    /// require the extra correlation layer spec.md §5 allows for stores
    /// that can't make that guarantee.
    pub async fn request_reply(&self, frame: Frame) -> Result<Frame, TransportError> {
        let id = frame.id.clone().ok_or(TransportError::Closed)?;
        let reply_channel = channels::session_out(&self.session_id, &id.to_string());

        let (mut reply_rx, handle) = self.store.subscribe(&reply_channel).await?;

        self.publish_inbound(&frame).await?;

        let result = reply_rx.recv().await;
        handle.unsubscribe();

        match result {
            Some(msg) => {
                let envelope: OutboundEnvelope =
                    serde_json::from_slice(&msg.payload).map_err(relay_protocol::ProtocolError::Malformed)?;
                Ok(envelope.message)
            }
            None => Err(TransportError::Closed),
        }
    }

    /// A notification from the client (no `id`): publish and return, no
    /// reply subscription is created (spec.md §4.7).
    pub async fn send_notification(&self, frame: Frame) -> Result<(), TransportError> {
        self.publish_inbound(&frame).await
    }

    async fn publish_inbound(&self, frame: &Frame) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(frame).map_err(relay_protocol::ProtocolError::Malformed)?;
        self.store.publish(&channels::session_in(&self.session_id), &payload).await?;
        Ok(())
    }

    /// A GET stream request: subscribe to the notification-stream channel
    /// and forward every frame until the caller drops the receiver (client
    /// disconnect) — `SharedStore::subscribe`'s handle unsubscribes on
    /// drop semantics are provided by the caller holding and eventually
    /// dropping/cancelling it.
    pub async fn open_notification_stream(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<Frame>, TransportError> {
        let (mut raw_rx, _handle) = self.store.subscribe(&channels::notification_stream(&self.session_id)).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(msg) = raw_rx.recv().await {
                if let Ok(envelope) = serde_json::from_slice::<OutboundEnvelope>(&msg.payload) {
                    if tx.send(envelope.message).is_err() {
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }
}

pub fn frame_is_notification(frame: &Frame) -> bool {
    frame.is_notification()
}

pub fn request_id_of(frame: &Frame) -> Option<RequestId> {
    frame.id.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_transport::ServerTransport;
    use crate::session_directory::SessionDirectory;
    use crate::testing::InMemoryStore;
    use crate::core::Transport;

    #[tokio::test]
    async fn reply_is_correlated_to_request_id() {
        let store = Arc::new(InMemoryStore::new());
        let directory = Arc::new(SessionDirectory::new((*store).clone()));
        let mut server = ServerTransport::new("S", store.clone(), directory);
        server.start().await.unwrap();

        let relay = RelayTransport::new(store.clone(), "S");

        // Simulate the owning replica's handler loop: echo back whatever
        // request comes in, with the same id.
        tokio::spawn(async move {
            if let Some(req) = server.recv().await {
                let reply = Frame::success(req.id.unwrap(), serde_json::json!({"echo": true}));
                server.send(reply).await.unwrap();
            }
        });

        let request = Frame::request(RequestId::Number(42), "tools/list", None);
        let reply = relay.request_reply(request).await.unwrap();
        assert_eq!(reply.id, Some(RequestId::Number(42)));
    }
}
