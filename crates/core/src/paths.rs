//! Well-known API paths shared by the gateway and the node backend.

/// Health probe served by both gateway (intercepted) and nodes.
pub const HEALTH_PATH: &str = "/api/health";

/// Node-list endpoint on the primary.
pub const NODES_PATH: &str = "/api/nodes";

/// Secondary self-registration endpoint on the primary.
pub const NODE_REGISTER_PATH: &str = "/api/nodes/register";

/// Prefix of all session (login / callback / logout) endpoints.
pub const AUTH_PREFIX: &str = "/api/auth/";

/// The "begin session" leg; the gateway remembers the external host here.
pub const AUTH_LOGIN_PATH: &str = "/api/auth/login";

/// "Who am I" lookup.
pub const AUTH_ME_PATH: &str = "/api/auth/me";

/// Query parameter carrying the target node for node-scoped requests.
pub const NODE_ID_PARAM: &str = "node_id";

/// Whether `path` is `prefix` itself or lies beneath it.
pub fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Node-management paths: the only ones that carry the gateway secret.
pub fn is_node_management(path: &str) -> bool {
    is_under(path, NODES_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_under_respects_segment_boundaries() {
        assert!(is_under("/api/nodes", "/api/nodes"));
        assert!(is_under("/api/nodes/register", "/api/nodes"));
        assert!(!is_under("/api/nodesx", "/api/nodes"));
        assert!(!is_under("/api", "/api/nodes"));
    }
}
