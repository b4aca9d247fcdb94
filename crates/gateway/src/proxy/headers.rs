//! Header rewriting for proxied requests and responses.

use std::net::IpAddr;

use axum::http::header::{CONNECTION, CONTENT_LENGTH, HOST, REFERER};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use shipyard_core::paths::is_node_management;
use shipyard_core::trust::{GATEWAY_SECRET_HEADER, ORIGIN_HOST_COOKIE, ORIGIN_HOST_COOKIE_MAX_AGE};

use crate::auth::cookie_value;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// RFC 7230 hop-by-hop headers, plus the non-standard `proxy-connection`.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Client-identity headers added by an edge network in front of the gateway.
const EDGE_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "cf-ray",
    "cf-ipcountry",
    "cf-visitor",
    "true-client-ip",
];

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// The originating client address: edge-supplied identity first, then the
/// leftmost forwarded-for entry, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    header("cf-connecting-ip")
        .or_else(|| header("true-client-ip"))
        .or_else(|| {
            header(X_FORWARDED_FOR).and_then(|chain| {
                chain
                    .split(',')
                    .map(str::trim)
                    .find(|ip| !ip.is_empty())
                    .map(str::to_string)
            })
        })
        .or_else(|| peer.map(|ip| ip.to_string()))
}

/// The host the browser actually used.
///
/// Priority: forwarded host, the origin-host cookie, the referrer's host,
/// then the request's own `Host`.
pub fn external_host(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get(X_FORWARDED_HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    forwarded
        .or_else(|| cookie_value(headers, ORIGIN_HOST_COOKIE))
        .or_else(|| {
            let referer = headers.get(REFERER)?.to_str().ok()?;
            referer_host(referer)
        })
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
}

fn referer_host(referer: &str) -> Option<String> {
    let url = reqwest::Url::parse(referer).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Headers to send upstream, and the external host they carry.
pub struct Outbound {
    pub headers: HeaderMap,
    pub host: Option<String>,
}

/// Build the upstream request headers from the inbound ones.
pub fn outbound(inbound: &HeaderMap, peer: Option<IpAddr>, path: &str, secret: &str) -> Outbound {
    let ip = client_ip(inbound, peer);
    let host = external_host(inbound);

    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    for name in EDGE_HEADERS {
        headers.remove(*name);
    }
    for name in [X_FORWARDED_FOR, X_FORWARDED_HOST, GATEWAY_SECRET_HEADER] {
        headers.remove(name);
    }
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);

    if let Some(value) = ip.as_deref().and_then(|ip| HeaderValue::from_str(ip).ok()) {
        headers.insert(X_FORWARDED_FOR, value);
    }
    if let Some(value) = host.as_deref().and_then(|h| HeaderValue::from_str(h).ok()) {
        headers.insert(X_FORWARDED_HOST, value.clone());
        headers.insert(HOST, value);
    }
    if is_node_management(path) {
        if let Ok(value) = HeaderValue::from_str(secret) {
            headers.insert(GATEWAY_SECRET_HEADER, value);
        }
    }

    Outbound { headers, host }
}

/// `Set-Cookie` value remembering `host` through the login round-trip.
pub fn origin_host_cookie(host: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{ORIGIN_HOST_COOKIE}={host}; Max-Age={ORIGIN_HOST_COOKIE_MAX_AGE}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .ok()
}
