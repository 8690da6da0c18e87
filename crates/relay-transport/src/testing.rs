//! A single-process `SharedStore` stand-in for this crate's own tests.
//! Deliberately duplicated rather than reused from `relay_auth`'s
//! equivalent: that one lives behind `#[cfg(test)]` in `relay-auth` and so
//! is invisible to crates depending on it normally, including this one.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_auth::AuthError;
use relay_auth::store::{Message, SetOptions, SharedStore, SubscriptionHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<std::time::Instant>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    data: Arc<Mutex<HashMap<String, Entry>>>,
    subs: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Message>>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(e: &Entry) -> bool {
        e.expires_at.map(|d| d > std::time::Instant::now()).unwrap_or(true)
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        let data = self.data.lock();
        Ok(data.get(key).filter(|e| Self::is_live(e)).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], opts: SetOptions) -> Result<Option<Vec<u8>>, AuthError> {
        let mut data = self.data.lock();
        let previous = data.get(key).filter(|e| Self::is_live(e)).map(|e| e.value.clone());
        let present = previous.is_some();

        if opts.only_if_absent && present {
            return Ok(previous);
        }
        if opts.only_if_present && !present {
            return Ok(previous);
        }

        let expires_at = if opts.keep_existing_ttl {
            data.get(key).and_then(|e| e.expires_at)
        } else {
            opts.ttl_seconds.map(|s| std::time::Instant::now() + std::time::Duration::from_secs(s))
        };

        data.insert(key.to_string(), Entry { value: value.to_vec(), expires_at });
        Ok(previous)
    }

    async fn delete(&self, key: &str) -> Result<bool, AuthError> {
        Ok(self.data.lock().remove(key).is_some())
    }

    async fn get_and_delete(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        let mut data = self.data.lock();
        Ok(data.remove(key).filter(Self::is_live).map(|e| e.value))
    }

    async fn exists(&self, key: &str) -> Result<bool, AuthError> {
        Ok(self.data.lock().get(key).map(Self::is_live).unwrap_or(false))
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), AuthError> {
        let subs = self.subs.lock();
        if let Some(senders) = subs.get(channel) {
            for s in senders {
                let _ = s.send(Message { channel: channel.to_string(), payload: payload.to_vec() });
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<(mpsc::UnboundedReceiver<Message>, SubscriptionHandle), AuthError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subs.lock().entry(channel.to_string()).or_default().push(tx);
        Ok((rx, SubscriptionHandle::noop()))
    }

    async fn subscriber_count(&self, channel: &str) -> Result<u64, AuthError> {
        let subs = self.subs.lock();
        Ok(subs.get(channel).map(|v| v.iter().filter(|s| !s.is_closed()).count() as u64).unwrap_or(0))
    }
}
