//! C4 — the token validator.
//!
//! Grounded in the teacher's `turbomcp-auth/src/server.rs`
//! (`BearerTokenValidator::{extract_from_header, validate_format}`,
//! `validate_audience`, `normalize_resource_uri`) for the bearer-extraction
//! and audience-check shape, and `introspection.rs`
//! (`IntrospectionClient::{introspect, is_token_active}`) for the delegated
//! mode's wire format.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::config::{AuthConfig, AuthMode};
use crate::error::AuthError;
use crate::records::AuthRecordStore;
use crate::store::SharedStore;
use crate::types::AuthContext;

/// Mirrors the teacher's `BearerTokenValidator::extract_from_header`:
/// accepts only the exact `Bearer <token>` form, case-sensitive on the
/// scheme per RFC 6750.
pub fn extract_bearer_token(header_value: Option<&str>) -> Result<&str, AuthError> {
    let value = header_value.ok_or_else(|| AuthError::Authentication("missing Authorization header".into()))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::Authentication("Authorization header is not a Bearer token".into()))?
        .trim();
    if token.is_empty() {
        return Err(AuthError::Authentication("empty bearer token".into()));
    }
    Ok(token)
}

/// Normalizes a resource URI for audience comparison: lowercases the
/// scheme+host, strips a trailing slash. Mirrors the teacher's
/// `normalize_resource_uri`.
pub fn normalize_resource_uri(uri: &str) -> String {
    let trimmed = uri.trim_end_matches('/');
    trimmed.to_ascii_lowercase()
}

/// RFC 8707 audience check: when the introspection response carries `aud`,
/// it must match this gateway's own base URI. Constant-time per the
/// teacher's use of `subtle::ConstantTimeEq` in `validate_audience`.
pub fn validate_audience(aud: &str, base_uri: &str) -> bool {
    let a = normalize_resource_uri(aud);
    let b = normalize_resource_uri(base_uri);
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    sub: Option<String>,
    client_id: Option<String>,
    scope: Option<String>,
    exp: Option<i64>,
    iat: Option<i64>,
    aud: Option<String>,
}

pub struct TokenValidator<S: SharedStore> {
    config: AuthConfig,
    records: Arc<AuthRecordStore<S>>,
    http: reqwest::Client,
    cache: Cache<String, AuthContext>,
}

impl<S: SharedStore> TokenValidator<S> {
    pub fn new(config: AuthConfig, records: Arc<AuthRecordStore<S>>) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.introspection_cache_capacity)
            .time_to_live(Duration::from_secs(config.introspection_cache_ttl_seconds))
            .build();
        Self {
            config,
            records,
            http: reqwest::Client::new(),
            cache,
        }
    }

    pub fn base_uri(&self) -> &str {
        &self.config.base_uri
    }

    pub async fn validate(&self, header_value: Option<&str>) -> Result<AuthContext, AuthError> {
        let token = extract_bearer_token(header_value)?;

        if let Some(ctx) = self.cache.get(token).await {
            return Ok(ctx);
        }

        let ctx = match self.config.mode {
            AuthMode::Internal => self.validate_co_hosted(token).await?,
            AuthMode::External => self.validate_delegated(token).await?,
        };

        self.cache.insert(token.to_string(), ctx.clone()).await;
        Ok(ctx)
    }

    async fn validate_co_hosted(&self, token: &str) -> Result<AuthContext, AuthError> {
        let installation = self
            .records
            .get_installation(token)
            .await?
            .ok_or_else(|| AuthError::Authentication("invalid_token".into()))?;

        let now = chrono::Utc::now().timestamp();
        let expires_at = installation.issued_at + installation.expires_in as i64;
        if now >= expires_at {
            return Err(AuthError::Authentication("invalid_token".into()));
        }

        Ok(AuthContext {
            token: token.to_string(),
            user_id: installation.user_id,
            client_id: installation.client_id,
            scopes: vec![],
            expires_at,
        })
    }

    async fn validate_delegated(&self, token: &str) -> Result<AuthContext, AuthError> {
        let url = self
            .config
            .external_introspection_url
            .as_deref()
            .ok_or_else(|| AuthError::Internal("external auth mode requires an introspection URL".into()))?;

        let mut request = self.http.post(url).form(&[("token", token)]);
        if let (Some(id), Some(secret)) = (
            &self.config.introspection_client_id,
            &self.config.introspection_client_secret,
        ) {
            request = request.basic_auth(id, Some(secret));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::UpstreamUnavailable(format!(
                "introspection endpoint returned {}",
                response.status()
            )));
        }

        let body: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))?;

        if !body.active {
            return Err(AuthError::Authentication("invalid_token".into()));
        }

        if let Some(aud) = &body.aud {
            if !validate_audience(aud, &self.config.base_uri) {
                return Err(AuthError::Authentication("invalid_token".into()));
            }
        }

        let user_id = body
            .sub
            .ok_or_else(|| AuthError::Authentication("introspection response missing sub".into()))?;

        Ok(AuthContext {
            token: token.to_string(),
            user_id,
            client_id: body.client_id.unwrap_or_default(),
            scopes: body
                .scope
                .map(|s| s.split(' ').map(str::to_string).collect())
                .unwrap_or_default(),
            expires_at: body.exp.unwrap_or(0),
        })
    }
}

/// Builds the `WWW-Authenticate` challenge header value. Mirrors the
/// teacher's `WwwAuthenticateBuilder`.
pub fn www_authenticate_header(base_uri: &str, error: Option<&str>, description: Option<&str>) -> String {
    match error {
        None => format!("Bearer realm=\"{base_uri}\""),
        Some(error) => {
            let mut s = format!("Bearer error=\"{error}\"");
            if let Some(desc) = description {
                s.push_str(&format!(", error_description=\"{desc}\""));
            }
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(extract_bearer_token(Some("Bearer abc123")).unwrap(), "abc123");
        assert!(extract_bearer_token(Some("Basic abc123")).is_err());
        assert!(extract_bearer_token(None).is_err());
    }

    #[test]
    fn audience_matches_ignoring_trailing_slash_and_case() {
        assert!(validate_audience("HTTPS://Example.com/", "https://example.com"));
        assert!(!validate_audience("https://evil.com", "https://example.com"));
    }

    #[test]
    fn www_authenticate_formats_challenge_and_error() {
        assert_eq!(
            www_authenticate_header("https://x", None, None),
            "Bearer realm=\"https://x\""
        );
        assert_eq!(
            www_authenticate_header("https://x", Some("invalid_token"), None),
            "Bearer error=\"invalid_token\""
        );
    }
}
