//! RFC 8414 metadata body for `/.well-known/oauth-authorization-server`
//! (SPEC_FULL.md §11.1), built the way the teacher builds protected-
//! resource metadata in `server.rs`'s `ProtectedResourceMetadataBuilder`
//! — a small builder over a typed struct rather than hand-assembled JSON.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub introspection_endpoint: String,
    pub revocation_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

pub struct AuthorizationServerMetadataBuilder {
    base_uri: String,
}

impl AuthorizationServerMetadataBuilder {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self { base_uri: base_uri.into() }
    }

    pub fn build(self) -> AuthorizationServerMetadata {
        let base = self.base_uri.trim_end_matches('/');
        AuthorizationServerMetadata {
            issuer: base.to_string(),
            authorization_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/token"),
            registration_endpoint: format!("{base}/register"),
            introspection_endpoint: format!("{base}/introspect"),
            revocation_endpoint: format!("{base}/revoke"),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec!["authorization_code".to_string(), "refresh_token".to_string()],
            code_challenge_methods_supported: vec!["S256".to_string()],
            token_endpoint_auth_methods_supported: vec!["client_secret_post".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_endpoints_relative_to_base() {
        let meta = AuthorizationServerMetadataBuilder::new("https://gateway.example/").build();
        assert_eq!(meta.issuer, "https://gateway.example");
        assert_eq!(meta.token_endpoint, "https://gateway.example/token");
    }
}
