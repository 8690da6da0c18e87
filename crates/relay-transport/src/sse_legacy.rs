//! C9 — the legacy SSE handler: `GET /sse` (long-lived stream) paired with
//! `POST /message?sessionId=...`. Per spec.md §4.9/§9, this predates the
//! request-id-addressed relay and deliberately does not enforce ownership
//! beyond bearer-auth — the session id here is a server-generated
//! capability, not a persisted ownership record. This gap is intentional,
//! not an oversight (see DESIGN.md's Open Question decision).

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use relay_auth::{SharedStore, TokenValidator};
use relay_protocol::Frame;
use serde::Deserialize;
use uuid::Uuid;

use crate::channels;

pub struct SseLegacyState<S: SharedStore> {
    pub store: Arc<S>,
    pub validator: Arc<TokenValidator<S>>,
}

pub fn router<S: SharedStore>(state: Arc<SseLegacyState<S>>) -> Router {
    Router::new()
        .route("/sse", get(sse_handler::<S>))
        .route("/message", post(message_handler::<S>))
        .with_state(state)
}

async fn sse_handler<S: SharedStore>(State(state): State<Arc<SseLegacyState<S>>>, headers: HeaderMap) -> Response {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if state.validator.validate(auth_header).await.is_err() {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let session_id = Uuid::new_v4().to_string();
    let (mut rx, _handle) = match state.store.subscribe(&channels::session_channel(&session_id)).await {
        Ok(pair) => pair,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let endpoint_event = Event::default().event("endpoint").data(format!("/message?sessionId={session_id}"));

    let event_stream = stream! {
        yield Ok::<Event, Infallible>(endpoint_event);
        loop {
            match rx.recv().await {
                Some(msg) => {
                    if let Ok(text) = String::from_utf8(msg.payload) {
                        yield Ok::<Event, Infallible>(Event::default().event("message").data(text));
                    }
                }
                None => break,
            }
        }
    };

    Sse::new(event_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))).into_response()
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

async fn message_handler<S: SharedStore>(
    State(state): State<Arc<SseLegacyState<S>>>,
    headers: HeaderMap,
    Query(query): Query<MessageQuery>,
    body: axum::body::Bytes,
) -> Response {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if state.validator.validate(auth_header).await.is_err() {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    // Validate the body is at least a well-formed JSON-RPC frame before
    // relaying it; malformed bodies are rejected rather than forwarded
    // blind.
    if serde_json::from_slice::<Frame>(&body).is_err() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match state.store.publish(&channels::session_channel(&query.session_id), &body).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
