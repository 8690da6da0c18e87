#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("shared store error: {0}")]
    Store(#[from] relay_auth::AuthError),

    #[error("malformed frame: {0}")]
    Frame(#[from] relay_protocol::ProtocolError),

    #[error("session not owned or not live")]
    NotOwned,

    #[error("transport closed")]
    Closed,
}
