//! Assembles the full HTTP surface: the OAuth endpoints (C3, mounted only
//! in co-hosted/internal auth mode), the Streamable-HTTP and legacy-SSE
//! transports (C8/C9), and `/healthz`. Nesting sub-routers under one
//! top-level `Router` mirrors the teacher's `create_router` composition.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use relay_auth::{AuthConfig, AuthMode, AuthRecordStore, AuthorizationServer, RedisStore, SharedStore, TokenValidator};
use relay_protocol::JsonRpcError;
use relay_transport::{MinimalMcpHandler, SessionDirectory, SseLegacyState, StreamableHttpState};
use tower_http::trace::TraceLayer;

use crate::bootstrap::DegradedModeFlag;
use crate::config::GatewayConfig;

pub fn build(
    config: &GatewayConfig,
    store: RedisStore,
    degraded: DegradedModeFlag,
) -> Router {
    let auth_config = AuthConfig {
        mode: config.auth_mode,
        base_uri: config.base_uri.clone(),
        external_introspection_url: config.external_introspection_url.clone(),
        introspection_client_id: None,
        introspection_client_secret: None,
        ..AuthConfig::default()
    };

    let records = Arc::new(AuthRecordStore::new(store.clone()));
    let validator = Arc::new(TokenValidator::new(auth_config.clone(), records.clone()));
    let directory = Arc::new(SessionDirectory::new(store.clone()));
    let store = Arc::new(store);
    let handler = Arc::new(MinimalMcpHandler::new("relay-gateway", env!("CARGO_PKG_VERSION")));

    let streamable_state = Arc::new(StreamableHttpState {
        store: store.clone(),
        directory,
        validator: validator.clone(),
        handler,
    });
    let sse_state = Arc::new(SseLegacyState {
        store: store.clone(),
        validator: validator.clone(),
    });

    let protected = Router::new()
        .merge(relay_transport::streamable_http::router(streamable_state))
        .merge(relay_transport::sse_legacy::router(sse_state))
        .layer(middleware::from_fn_with_state(degraded.clone(), degraded_mode_guard));

    let healthz_router = Router::new()
        .route("/healthz", axum::routing::get(healthz))
        .with_state(HealthState { degraded: degraded.clone(), store: store.clone() });

    let mut router = Router::new().merge(protected).merge(healthz_router);

    if matches!(config.auth_mode, AuthMode::Internal) {
        let auth_server = Arc::new(AuthorizationServer::new(auth_config, records));
        router = router.merge(relay_auth::server::router(auth_server));
    }

    router.layer(TraceLayer::new_for_http())
}

/// Fails closed with the §4.10 JSON-RPC body for every request while the
/// process is degraded, rather than letting each handler's own upstream
/// call time out individually.
async fn degraded_mode_guard(
    State(flag): State<DegradedModeFlag>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    if flag.is_degraded() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(JsonRpcError::auth_service_unavailable("authorization server unreachable")),
        )
            .into_response();
    }
    next.run(request).await
}

#[derive(Clone)]
struct HealthState {
    degraded: DegradedModeFlag,
    store: Arc<RedisStore>,
}

/// SPEC_FULL.md §11 item 6: unauthenticated liveness/readiness for a load
/// balancer, surfacing the otherwise-invisible degraded-mode flag.
async fn healthz(State(state): State<HealthState>) -> Response {
    let store_ok = state.store.exists("__healthz__").await.is_ok();
    let auth_ok = !state.degraded.is_degraded();
    let status = if store_ok && auth_ok { "ok" } else { "degraded" };
    let code = if store_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        code,
        axum::Json(serde_json::json!({ "status": status, "store": store_ok, "auth": auth_ok })),
    )
        .into_response()
}
