//! Fixed shared-store channel/key namespaces (spec.md §6), kept in one
//! place since every one of C5-C9 needs at least one of these names and
//! they must agree byte-for-byte across replicas.

pub fn session_in(session_id: &str) -> String {
    format!("mcp:shttp:toserver:{session_id}")
}

pub fn session_out(session_id: &str, request_id: &str) -> String {
    format!("mcp:shttp:toclient:{session_id}:{request_id}")
}

pub const NOTIFICATION_STREAM_REQUEST_ID: &str = "__stream";

pub fn notification_stream(session_id: &str) -> String {
    session_out(session_id, NOTIFICATION_STREAM_REQUEST_ID)
}

pub fn session_control(session_id: &str) -> String {
    format!("mcp:control:{session_id}")
}

/// Legacy SSE's single bidirectional channel (C9).
pub fn session_channel(session_id: &str) -> String {
    format!("mcp:{session_id}")
}

pub fn owner_key(session_id: &str) -> String {
    format!("session:{session_id}:owner")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_match_the_fixed_namespace() {
        assert_eq!(session_in("S"), "mcp:shttp:toserver:S");
        assert_eq!(session_out("S", "7"), "mcp:shttp:toclient:S:7");
        assert_eq!(notification_stream("S"), "mcp:shttp:toclient:S:__stream");
        assert_eq!(session_control("S"), "mcp:control:S");
        assert_eq!(session_channel("S"), "mcp:S");
        assert_eq!(owner_key("S"), "session:S:owner");
    }
}
