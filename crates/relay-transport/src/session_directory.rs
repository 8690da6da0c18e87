//! C5 — the session directory: ownership mapping plus derived liveness.

use relay_auth::SharedStore;
use relay_auth::store::SetOptions;

use crate::channels;
use crate::error::TransportError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ShutdownControlMessage {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ShutdownControlMessage {
    pub fn shutdown() -> Self {
        Self { kind: "shutdown".to_string() }
    }
}

pub struct SessionDirectory<S: SharedStore> {
    store: S,
}

impl<S: SharedStore> SessionDirectory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Unconditional set, written exactly once per session at initialize
    /// (spec.md §5's shared-resource policy: no race because `setOwner`
    /// precedes the initialize response).
    pub async fn set_owner(&self, session_id: &str, user_id: &str) -> Result<(), TransportError> {
        self.store
            .set(&channels::owner_key(session_id), user_id.as_bytes(), SetOptions::default())
            .await?;
        Ok(())
    }

    pub async fn get_owner(&self, session_id: &str) -> Result<Option<String>, TransportError> {
        match self.store.get(&channels::owner_key(session_id)).await? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    /// True iff the session is live *and* owned by `user_id` (spec.md
    /// §4.5). Liveness gates ownership so a stale record left behind by a
    /// crashed replica cannot authorize access to a session nobody is
    /// actually serving.
    pub async fn is_owned_by(&self, session_id: &str, user_id: &str) -> Result<bool, TransportError> {
        if !self.is_live(session_id).await? {
            return Ok(false);
        }
        Ok(self.get_owner(session_id).await?.as_deref() == Some(user_id))
    }

    pub async fn is_live(&self, session_id: &str) -> Result<bool, TransportError> {
        let count = self.store.subscriber_count(&channels::session_in(session_id)).await?;
        Ok(count > 0)
    }

    pub async fn delete_owner(&self, session_id: &str) -> Result<(), TransportError> {
        self.store.delete(&channels::owner_key(session_id)).await?;
        Ok(())
    }

    /// Publishes a `{type: "shutdown"}` control message; the owning
    /// `ServerTransport` (wherever it lives) observes it and tears down,
    /// draining all dependent relays with it.
    pub async fn shutdown(&self, session_id: &str) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(&ShutdownControlMessage::shutdown())
            .expect("ShutdownControlMessage always serializes");
        self.store.publish(&channels::session_control(session_id), &payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;

    #[tokio::test]
    async fn ownership_requires_liveness() {
        let store = InMemoryStore::new();
        let dir = SessionDirectory::new(store.clone());
        dir.set_owner("S", "U1").await.unwrap();

        // Not live yet: nobody has subscribed to session-in(S).
        assert!(!dir.is_owned_by("S", "U1").await.unwrap());

        let (_rx, _handle) = store.subscribe(&channels::session_in("S")).await.unwrap();
        assert!(dir.is_owned_by("S", "U1").await.unwrap());
        assert!(!dir.is_owned_by("S", "U2").await.unwrap());
    }

    #[tokio::test]
    async fn shutdown_publishes_control_message() {
        let store = InMemoryStore::new();
        let dir = SessionDirectory::new(store.clone());
        let (mut rx, _handle) = store.subscribe(&channels::session_control("S")).await.unwrap();
        dir.shutdown("S").await.unwrap();
        let msg = rx.recv().await.unwrap();
        let parsed: ShutdownControlMessage = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(parsed.kind, "shutdown");
    }
}
