//! OAuth 2.1 + PKCE authorization server (C3), resource-server token
//! validator (C4), the shared-store adapter (C1), and the encrypted auth
//! record store (C2) that backs both.

pub mod config;
pub mod discovery;
pub mod error;
pub mod oauth2;
pub mod pkce;
pub mod records;
pub mod server;
pub mod store;
pub mod types;
pub mod validator;

pub use config::{AuthConfig, AuthMode};
pub use error::AuthError;
pub use records::AuthRecordStore;
pub use server::AuthorizationServer;
pub use store::{RedisStore, SharedStore};
pub use validator::TokenValidator;
