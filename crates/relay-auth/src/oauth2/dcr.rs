//! RFC 7591 dynamic client registration shapes.
//!
//! The teacher's `oauth2/dcr.rs` implements `DcrClient`, the *client* side
//! of registration (registering this process as an OAuth client against
//! someone else's authorization server). This crate's `/register` endpoint
//! plays the opposite role — it *is* the authorization server being
//! registered against — so only the request/response field names are
//! reused here, not the teacher's HTTP client code.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub client_name: String,
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResponse {
    pub client_id: String,
    pub client_secret: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub client_id_issued_at: i64,
    pub client_secret_expires_at: i64,
}
