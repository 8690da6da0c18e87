use serde::{Deserialize, Serialize};

/// spec.md §3 — an OAuth client. Never mutated after registration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub issued_at: i64,
}

impl std::fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("client_name", &self.client_name)
            .field("redirect_uris", &self.redirect_uris)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

pub const CLIENT_TTL_SECONDS: u64 = 30 * 24 * 3600;

/// spec.md §3 — state between `/authorize` and `/token`, keyed by the
/// single-use authorization code itself.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub state: Option<String>,
    pub user_id: String,
}

impl std::fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("code_challenge", &"<redacted>")
            .field("code_challenge_method", &self.code_challenge_method)
            .field("state", &self.state)
            .field("user_id", &self.user_id)
            .finish()
    }
}

pub const PENDING_TTL_SECONDS: u64 = 10 * 60;

/// spec.md §3 — the one-shot record produced at authorization completion.
/// Single-use is enforced by `AuthRecordStore::claim_exchange_once`'s
/// atomic get-and-delete (P2), not by a field on this record.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenExchange {
    pub access_token: String,
}

impl std::fmt::Debug for TokenExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchange").field("access_token", &"<redacted>").finish()
    }
}

pub const EXCHANGE_TTL_SECONDS: u64 = 10 * 60;

/// spec.md §3 — an authorized session of a user on a client, keyed by
/// `access_token`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Installation {
    pub user_id: String,
    pub client_id: String,
    pub issued_at: i64,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub upstream_token_stub: String,
    pub expires_in: u64,
}

impl std::fmt::Debug for Installation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installation")
            .field("user_id", &self.user_id)
            .field("client_id", &self.client_id)
            .field("issued_at", &self.issued_at)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("upstream_token_stub", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

pub const INSTALLATION_TTL_SECONDS: u64 = 7 * 24 * 3600;

/// spec.md §3 — `refresh_token -> access_token`, TTL mirrors the
/// installation's.
#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshMapping {
    pub access_token: String,
}

impl std::fmt::Debug for RefreshMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshMapping").field("access_token", &"<redacted>").finish()
    }
}

/// What downstream handlers receive after a bearer token validates
/// (spec.md §4.4).
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub token: String,
    pub user_id: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub expires_at: i64,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: u64,
}
