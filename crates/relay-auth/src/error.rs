/// Error kinds for the auth crate. These map onto spec.md §7's taxonomy but
/// stay domain-typed here; the HTTP/JSON-RPC translation happens once, at
/// the gateway boundary (`relay-gateway::error`).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("authorization code already used")]
    Replay,

    #[error("shared store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("upstream introspection endpoint unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn is_retriable_by_caller(&self) -> bool {
        false
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(e: redis::RedisError) -> Self {
        AuthError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Internal(format!("serialization: {e}"))
    }
}
