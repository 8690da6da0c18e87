//! C2 — the auth record store.
//!
//! Wraps `SharedStore` (C1) with per-record-type key prefixes and
//! encryption-at-rest. spec.md §4.2 leaves the concrete cipher as an
//! implementation choice ("AES-CBC at rest with the token as key is an
//! implementation choice; the contract is encrypted-at-rest, token-keyed,
//! TTL'd" — §1). This implementation uses AES-256-GCM (authenticated,
//! avoiding CBC's padding-oracle class of bugs) keyed by SHA-256(k), which
//! satisfies "possession of k is required to decrypt" without introducing
//! a CBC IV-reuse footgun. The teacher crate does not implement at-rest
//! record encryption itself (its auth crate is a resource-server validator
//! and OAuth client, not an authorization server with its own store), so
//! this module's shape follows the teacher's existing cryptographic
//! primitive choices (`sha2`, `subtle`) rather than a specific teacher file.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AuthError;
use crate::store::{SetOptions, SharedStore};
use crate::types::*;

#[derive(Clone, Copy)]
pub enum RecordKind {
    Client,
    Pending,
    Exchange,
    /// The "claimed" marker of the two-phase mark-then-sweep replay
    /// protection spec.md §9 describes as the fallback when the store
    /// lacks a native compare-and-set: written once a claim succeeds, and
    /// outliving the `Exchange` record itself so a racing second claim can
    /// still find the access token to revoke.
    ExchangeClaimed,
    Installation,
    Refresh,
}

impl RecordKind {
    fn prefix(self) -> &'static str {
        match self {
            RecordKind::Client => "auth:client:",
            RecordKind::Pending => "auth:pending:",
            RecordKind::Exchange => "auth:exch:",
            RecordKind::ExchangeClaimed => "auth:exch-claimed:",
            RecordKind::Installation => "auth:installation:",
            RecordKind::Refresh => "auth:refresh:",
        }
    }
}

fn hash_hex(k: &str) -> String {
    let digest = Sha256::digest(k.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

fn store_key(kind: RecordKind, k: &str) -> String {
    // ClientRegistration is the one record type keyed by a non-secret,
    // publicly-known clientId; spec.md §6's namespace list shows it
    // unhashed (`auth:client:<clientId>`) while every other kind is
    // `<sha>`. Hashing it anyway would be harmless but would break the
    // fixed namespace contract other readers rely on.
    match kind {
        RecordKind::Client => format!("{}{}", kind.prefix(), k),
        _ => format!("{}{}", kind.prefix(), hash_hex(k)),
    }
}

fn cipher_for(k: &str) -> Aes256Gcm {
    let key_material = Sha256::digest(k.as_bytes());
    Aes256Gcm::new_from_slice(&key_material).expect("SHA-256 digest is exactly 32 bytes")
}

fn encrypt(k: &str, plaintext: &[u8]) -> Result<Vec<u8>, AuthError> {
    let cipher = cipher_for(k);
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AuthError::Internal(format!("record encryption failed: {e}")))?;
    let mut out = Vec::with_capacity(12 + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt(k: &str, blob: &[u8]) -> Result<Vec<u8>, AuthError> {
    if blob.len() < 12 {
        return Err(AuthError::Internal("ciphertext too short".into()));
    }
    let (nonce_bytes, ciphertext) = blob.split_at(12);
    let cipher = cipher_for(k);
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| AuthError::Internal(format!("record decryption failed: {e}")))
}

#[derive(Clone, Serialize, Deserialize)]
struct ExchangeClaimedMarker {
    access_token: String,
}

pub enum ExchangeClaim {
    Won { access_token: String },
    Replayed { access_token: Option<String> },
}

pub struct AuthRecordStore<S: SharedStore> {
    store: S,
}

impl<S: SharedStore> AuthRecordStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn put<T: serde::Serialize>(
        &self,
        kind: RecordKind,
        k: &str,
        record: &T,
        ttl_seconds: u64,
    ) -> Result<(), AuthError> {
        let plaintext = serde_json::to_vec(record)?;
        let ciphertext = encrypt(k, &plaintext)?;
        self.store
            .set(&store_key(kind, k), &ciphertext, SetOptions::with_ttl(ttl_seconds))
            .await?;
        Ok(())
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        kind: RecordKind,
        k: &str,
    ) -> Result<Option<T>, AuthError> {
        match self.store.get(&store_key(kind, k)).await? {
            None => Ok(None),
            Some(blob) => {
                let plaintext = decrypt(k, &blob)?;
                Ok(Some(serde_json::from_slice(&plaintext)?))
            }
        }
    }

    // --- ClientRegistration ---

    pub async fn put_client(&self, client: &ClientRegistration) -> Result<(), AuthError> {
        self.put(RecordKind::Client, &client.client_id, client, CLIENT_TTL_SECONDS).await
    }

    pub async fn get_client(&self, client_id: &str) -> Result<Option<ClientRegistration>, AuthError> {
        self.fetch(RecordKind::Client, client_id).await
    }

    // --- PendingAuthorization ---

    pub async fn put_pending(&self, code: &str, pending: &PendingAuthorization) -> Result<(), AuthError> {
        self.put(RecordKind::Pending, code, pending, PENDING_TTL_SECONDS).await
    }

    pub async fn get_pending(&self, code: &str) -> Result<Option<PendingAuthorization>, AuthError> {
        self.fetch(RecordKind::Pending, code).await
    }

    pub async fn delete_pending(&self, code: &str) -> Result<(), AuthError> {
        self.store.delete(&store_key(RecordKind::Pending, code)).await?;
        Ok(())
    }

    // --- TokenExchange ---

    pub async fn put_exchange(&self, code: &str, exch: &TokenExchange) -> Result<(), AuthError> {
        self.put(RecordKind::Exchange, code, exch, EXCHANGE_TTL_SECONDS).await
    }

    /// The single-use guarantee (P2). `get_and_delete` on the `Exchange`
    /// record is the compare-and-set: exactly one caller observes
    /// `Some(..)` for a given code, because the store removes the key as
    /// part of the same operation that reads it (spec.md §4.2 asks for
    /// this "atomic get-delete" primitive from C1 directly). The winner's
    /// access token is additionally written to an `ExchangeClaimed`
    /// marker — the two-phase "mark-then-sweep" record spec.md §9
    /// describes for stores that cannot offer a first-class CAS — so that
    /// a racing or later second claim can still discover which
    /// installation to revoke even though the `Exchange` record itself is
    /// already gone.
    pub async fn claim_exchange_once(&self, code: &str) -> Result<ExchangeClaim, AuthError> {
        let key = store_key(RecordKind::Exchange, code);
        match self.store.get_and_delete(&key).await? {
            Some(blob) => {
                let plaintext = decrypt(code, &blob)?;
                let exch: TokenExchange = serde_json::from_slice(&plaintext)?;
                self.put(
                    RecordKind::ExchangeClaimed,
                    code,
                    &ExchangeClaimedMarker {
                        access_token: exch.access_token.clone(),
                    },
                    INSTALLATION_TTL_SECONDS,
                )
                .await?;
                Ok(ExchangeClaim::Won { access_token: exch.access_token })
            }
            None => match self.fetch::<ExchangeClaimedMarker>(RecordKind::ExchangeClaimed, code).await? {
                Some(marker) => Ok(ExchangeClaim::Replayed { access_token: Some(marker.access_token) }),
                None => Ok(ExchangeClaim::Replayed { access_token: None }),
            },
        }
    }

    // --- Installation ---

    pub async fn put_installation(&self, installation: &Installation) -> Result<(), AuthError> {
        self.put(
            RecordKind::Installation,
            &installation.access_token,
            installation,
            INSTALLATION_TTL_SECONDS,
        )
        .await
    }

    pub async fn get_installation(&self, access_token: &str) -> Result<Option<Installation>, AuthError> {
        self.fetch(RecordKind::Installation, access_token).await
    }

    pub async fn revoke_installation(&self, access_token: &str) -> Result<Option<Installation>, AuthError> {
        let key = store_key(RecordKind::Installation, access_token);
        match self.store.get_and_delete(&key).await? {
            None => Ok(None),
            Some(blob) => {
                let plaintext = decrypt(access_token, &blob)?;
                let installation: Installation = serde_json::from_slice(&plaintext)?;
                if let Some(refresh) = &installation.refresh_token {
                    self.delete_refresh_mapping(refresh).await?;
                }
                Ok(Some(installation))
            }
        }
    }

    // --- RefreshMapping ---

    pub async fn put_refresh_mapping(&self, refresh_token: &str, access_token: &str) -> Result<(), AuthError> {
        self.put(
            RecordKind::Refresh,
            refresh_token,
            &RefreshMapping {
                access_token: access_token.to_string(),
            },
            INSTALLATION_TTL_SECONDS,
        )
        .await
    }

    pub async fn get_refresh_mapping(&self, refresh_token: &str) -> Result<Option<RefreshMapping>, AuthError> {
        self.fetch(RecordKind::Refresh, refresh_token).await
    }

    pub async fn delete_refresh_mapping(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.store.delete(&store_key(RecordKind::Refresh, refresh_token)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::in_memory::InMemoryStore;

    fn sample_client() -> ClientRegistration {
        ClientRegistration {
            client_id: "C".into(),
            client_secret: "S".into(),
            client_name: "t".into(),
            redirect_uris: vec!["http://x/cb".into()],
            issued_at: 0,
        }
    }

    #[tokio::test]
    async fn round_trips_through_encryption() {
        let records = AuthRecordStore::new(InMemoryStore::new());
        records.put_client(&sample_client()).await.unwrap();
        let fetched = records.get_client("C").await.unwrap().unwrap();
        assert_eq!(fetched.client_secret, "S");
    }

    #[tokio::test]
    async fn exchange_claim_is_single_use() {
        let records = AuthRecordStore::new(InMemoryStore::new());
        records
            .put_exchange("code123", &TokenExchange { access_token: "T".into() })
            .await
            .unwrap();

        assert!(matches!(
            records.claim_exchange_once("code123").await.unwrap(),
            ExchangeClaim::Won { access_token } if access_token == "T"
        ));
        assert!(matches!(
            records.claim_exchange_once("code123").await.unwrap(),
            ExchangeClaim::Replayed { access_token: Some(t) } if t == "T"
        ));
    }

    #[tokio::test]
    async fn revoking_installation_cascades_to_refresh_mapping() {
        let records = AuthRecordStore::new(InMemoryStore::new());
        let installation = Installation {
            user_id: "U".into(),
            client_id: "C".into(),
            issued_at: 0,
            access_token: "T".into(),
            refresh_token: Some("R".into()),
            upstream_token_stub: "stub".into(),
            expires_in: 3600,
        };
        records.put_installation(&installation).await.unwrap();
        records.put_refresh_mapping("R", "T").await.unwrap();

        records.revoke_installation("T").await.unwrap();

        assert!(records.get_installation("T").await.unwrap().is_none());
        assert!(records.get_refresh_mapping("R").await.unwrap().is_none());
    }
}
