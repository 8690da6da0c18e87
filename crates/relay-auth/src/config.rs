use serde::{Deserialize, Serialize};

/// Selects C4's two modes (spec.md §4.4), chosen at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// This process is also the authorization server; validation looks up
    /// the installation directly via the auth record store.
    Internal,
    /// Validation delegates to an external introspection endpoint.
    External,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub base_uri: String,
    pub external_introspection_url: Option<String>,
    pub introspection_client_id: Option<String>,
    pub introspection_client_secret: Option<String>,
    /// Bounded-TTL LRU cache for introspection results (spec.md §4.4),
    /// optional and default <= 60s.
    pub introspection_cache_ttl_seconds: u64,
    pub introspection_cache_capacity: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Internal,
            base_uri: "http://localhost:8080".to_string(),
            external_introspection_url: None,
            introspection_client_id: None,
            introspection_client_secret: None,
            introspection_cache_ttl_seconds: 60,
            introspection_cache_capacity: 10_000,
        }
    }
}
