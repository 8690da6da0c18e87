//! C6 — `ServerTransport`. One per live session, on whichever replica
//! handled its `initialize`. Wires the (opaque, out-of-scope per spec.md
//! §1) MCP handler into the shared store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_auth::SharedStore;
use relay_protocol::{Frame, RequestId};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::channels;
use crate::core::Transport;
use crate::error::TransportError;
use crate::session_directory::SessionDirectory;

const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: Frame,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

impl OutboundEnvelope {
    pub fn mcp(message: Frame) -> Self {
        Self { kind: "mcp".to_string(), message, options: None }
    }
}

pub struct ServerTransport<S: SharedStore> {
    session_id: String,
    store: Arc<S>,
    directory: Arc<SessionDirectory<S>>,
    inbound_rx: Option<mpsc::UnboundedReceiver<Frame>>,
    last_activity: Arc<tokio::sync::Mutex<Instant>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    background: Vec<tokio::task::JoinHandle<()>>,
}

impl<S: SharedStore> ServerTransport<S> {
    pub fn new(session_id: impl Into<String>, store: Arc<S>, directory: Arc<SessionDirectory<S>>) -> Self {
        Self {
            session_id: session_id.into(),
            store,
            directory,
            inbound_rx: None,
            last_activity: Arc::new(tokio::sync::Mutex::new(Instant::now())),
            shutdown_tx: None,
            background: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl<S: SharedStore> Transport for ServerTransport<S> {
    async fn start(&mut self) -> Result<(), TransportError> {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        self.inbound_rx = Some(frame_rx);

        // session-in(sessionId): every MCP frame delivered to the handler,
        // in publisher order (spec.md §4.6).
        let (mut in_rx, _in_handle) = self.store.subscribe(&channels::session_in(&self.session_id)).await?;
        let last_activity = self.last_activity.clone();
        let forward_tx = frame_tx.clone();
        self.background.push(tokio::spawn(async move {
            while let Some(msg) = in_rx.recv().await {
                if let Ok(frame) = serde_json::from_slice::<Frame>(&msg.payload) {
                    *last_activity.lock().await = Instant::now();
                    if forward_tx.send(frame).is_err() {
                        break;
                    }
                }
            }
        }));

        // session-control(sessionId): on `shutdown`, close the transport.
        let (mut control_rx, _control_handle) =
            self.store.subscribe(&channels::session_control(&self.session_id)).await?;
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        let session_id = self.session_id.clone();
        self.background.push(tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                #[derive(serde::Deserialize)]
                struct Ctrl {
                    #[serde(rename = "type")]
                    kind: String,
                }
                if let Ok(ctrl) = serde_json::from_slice::<Ctrl>(&msg.payload) {
                    if ctrl.kind == "shutdown" {
                        tracing::info!(session_id, "server transport received shutdown control message");
                        break;
                    }
                }
            }
        }));
        let _ = shutdown_rx;

        // Idle timer: 5 minutes of no inbound traffic self-shuts-down via
        // the control channel, tearing down this transport and any
        // dependent relays uniformly (spec.md §4.6, §5).
        let directory = self.directory.clone();
        let session_id = self.session_id.clone();
        let last_activity = self.last_activity.clone();
        self.background.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(15));
            loop {
                ticker.tick().await;
                let elapsed = last_activity.lock().await.elapsed();
                if elapsed >= IDLE_TIMEOUT {
                    tracing::info!(session_id, "idle timeout: shutting down session");
                    let _ = directory.shutdown(&session_id).await;
                    let _ = directory.delete_owner(&session_id).await;
                    break;
                }
            }
        }));

        Ok(())
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let channel = match &frame.id {
            Some(RequestId::Number(_)) | Some(RequestId::String(_)) if frame.method.is_none() => {
                // A response: publish to the per-request-id reply channel.
                channels::session_out(&self.session_id, &frame.id.as_ref().unwrap().to_string())
            }
            _ => {
                // A server-initiated notification: the dedicated stream
                // channel.
                channels::notification_stream(&self.session_id)
            }
        };
        let envelope = OutboundEnvelope::mcp(frame);
        let payload = serde_json::to_vec(&envelope).map_err(relay_protocol::ProtocolError::Malformed)?;
        self.store.publish(&channel, &payload).await?;
        Ok(())
    }

    async fn close(&mut self) {
        for handle in self.background.drain(..) {
            handle.abort();
        }
    }

    async fn recv(&mut self) -> Option<Frame> {
        match &mut self.inbound_rx {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;

    #[tokio::test]
    async fn publishes_response_to_request_id_channel_and_notification_to_stream() {
        let store = Arc::new(InMemoryStore::new());
        let directory = Arc::new(SessionDirectory::new((*store).clone()));
        let mut transport = ServerTransport::new("S", store.clone(), directory);
        transport.start().await.unwrap();

        let (mut reply_rx, _h) = store.subscribe(&channels::session_out("S", "1")).await.unwrap();
        let (mut stream_rx, _h2) = store.subscribe(&channels::notification_stream("S")).await.unwrap();

        transport
            .send(Frame::success(RequestId::Number(1), serde_json::json!({"ok": true})))
            .await
            .unwrap();
        let reply = reply_rx.recv().await.unwrap();
        let envelope: OutboundEnvelope = serde_json::from_slice(&reply.payload).unwrap();
        assert_eq!(envelope.message.id, Some(RequestId::Number(1)));

        transport
            .send(Frame::notification("notifications/progress", None))
            .await
            .unwrap();
        let notif = stream_rx.recv().await.unwrap();
        let envelope: OutboundEnvelope = serde_json::from_slice(&notif.payload).unwrap();
        assert_eq!(envelope.message.method.as_deref(), Some("notifications/progress"));
    }
}
