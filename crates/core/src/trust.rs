//! Gateway-to-node shared-secret trust and session cookie names.

/// Header carrying the shared secret on node-management requests.
pub const GATEWAY_SECRET_HEADER: &str = "x-shipyard-gateway-secret";

/// Session token cookie issued by the primary at login.
pub const SESSION_COOKIE: &str = "shipyard_session";

/// Short-lived cookie remembering the external host across the login
/// redirect round-trip.
pub const ORIGIN_HOST_COOKIE: &str = "shipyard_origin_host";

/// Lifetime of [`ORIGIN_HOST_COOKIE`], in seconds.
pub const ORIGIN_HOST_COOKIE_MAX_AGE: u32 = 300;

/// Compare a presented secret against the expected one without an early
/// exit on the first differing byte.
pub fn secret_matches(presented: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    let a = presented.as_bytes();
    let b = expected.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
