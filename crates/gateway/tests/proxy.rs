mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use shipyard_core::trust::GATEWAY_SECRET_HEADER;
use shipyard_gateway::auth::JwtValidator;
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn node_scoped_request_reaches_the_named_node() {
    let cluster = Cluster::ready().await;

    let response = cluster
        .app()
        .oneshot(get("/api/apps/123/logs?node_id=online-node&tail=50"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echo = body_json(response).await;
    assert_eq!(echo["node"], "online-node");
    assert_eq!(echo["path"], "/api/apps/123/logs");
    assert_eq!(echo["query"], "node_id=online-node&tail=50");
}

#[tokio::test]
async fn unresolvable_route_is_a_caller_error() {
    let cluster = Cluster::ready().await;

    for uri in [
        "/api/apps/123",
        "/api/apps/123?node_id=offline-node",
        "/api/jobs/5?node_id=no-such-node",
    ] {
        let response = cluster.app().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let body = body_json(response).await;
        assert_eq!(body["code"], "ROUTE_UNRESOLVABLE");
    }
}

#[tokio::test]
async fn creation_body_is_forwarded_byte_for_byte() {
    let cluster = Cluster::ready().await;
    let raw = r#"{ "node_id": "online-node",  "name": "blog" }"#;

    let response = cluster
        .app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/apps")
                .header("content-type", "application/json")
                .body(Body::from(raw))
                .unwrap(),
        )
        .await
        .unwrap();

    let echo = body_json(response).await;
    assert_eq!(echo["node"], "online-node");
    assert_eq!(echo["body"], raw);
}

#[tokio::test]
async fn creation_for_offline_node_goes_to_primary() {
    let cluster = Cluster::ready().await;

    let response = cluster
        .app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/tunnels/quick")
                .body(Body::from(r#"{"node_id":"offline-node"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["node"], "primary");
}

#[tokio::test]
async fn unreachable_node_yields_bad_gateway() {
    let cluster = Cluster::ready().await;

    let response = cluster
        .app()
        .oneshot(get("/api/apps/1?node_id=dead-node"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "BAD_GATEWAY");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let cluster = Cluster::ready().await;

    let response = cluster
        .app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/apps")
                .body(Body::from(vec![b'x'; 4096]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// ---------------------------------------------------------------------------
// Header handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn edge_headers_are_stripped_and_client_ip_collapsed() {
    let cluster = Cluster::ready().await;

    let response = cluster
        .app()
        .oneshot(
            Request::builder()
                .uri("/api/apps")
                .header("x-forwarded-for", "203.0.113.9, 10.0.0.2")
                .header("cf-ray", "8a1b2c")
                .header("cf-ipcountry", "NL")
                .header(GATEWAY_SECRET_HEADER, "forged")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = &body_json(response).await["headers"];
    assert_eq!(headers["x-forwarded-for"], "203.0.113.9");
    assert!(headers.get("cf-ray").is_none());
    assert!(headers.get("cf-ipcountry").is_none());
    assert!(headers.get(GATEWAY_SECRET_HEADER).is_none());
}

#[tokio::test]
async fn secret_is_attached_only_to_node_management() {
    let cluster = Cluster::ready().await;

    let nodes = cluster.app().oneshot(get("/api/nodes/main")).await.unwrap();
    let nodes = body_json(nodes).await;
    assert_eq!(nodes["node"], "primary");
    assert_eq!(nodes["headers"][GATEWAY_SECRET_HEADER], SECRET);

    let settings = cluster.app().oneshot(get("/api/settings")).await.unwrap();
    let settings = body_json(settings).await;
    assert!(settings["headers"].get(GATEWAY_SECRET_HEADER).is_none());
}

#[tokio::test]
async fn external_host_survives_the_hop() {
    let cluster = Cluster::ready().await;

    let response = cluster
        .app()
        .oneshot(
            Request::builder()
                .uri("/api/apps/1?node_id=online-node")
                .header("host", "gateway.internal:8080")
                .header("cookie", "shipyard_origin_host=panel.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = &body_json(response).await["headers"];
    assert_eq!(headers["host"], "panel.example.com");
    assert_eq!(headers["x-forwarded-host"], "panel.example.com");
}

#[tokio::test]
async fn login_sets_origin_host_cookie() {
    let cluster = Cluster::ready().await;

    let response = cluster
        .app()
        .oneshot(
            Request::builder()
                .uri("/api/auth/login")
                .header("x-forwarded-host", "panel.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let cookie = response.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(cookie.starts_with("shipyard_origin_host=panel.example.com;"));
    assert!(cookie.contains("Max-Age=300"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
}

#[tokio::test]
async fn redirects_are_relayed_not_followed() {
    let cluster = Cluster::ready().await;

    let response = cluster
        .app()
        .oneshot(get("/api/apps/7/go?node_id=online-node"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()["location"], "/api/apps/7");
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auth_guards_api_but_not_bypass_paths() {
    let cluster = Cluster::start(Arc::new(JwtValidator::new("jwt-key"))).await;
    cluster.registry.refresh().await.unwrap();

    let denied = cluster.app().oneshot(get("/api/apps")).await.unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(denied).await["code"], "UNAUTHORIZED");

    for open in ["/api/auth/login", "/api/auth/me", "/api/health"] {
        let response = cluster.app().oneshot(get(open)).await.unwrap();
        assert_ne!(response.status(), StatusCode::UNAUTHORIZED, "{open}");
    }

    let token = encode(
        &Header::default(),
        &json!({ "sub": "operator", "exp": chrono::Utc::now().timestamp() + 600 }),
        &EncodingKey::from_secret(b"jwt-key"),
    )
    .unwrap();
    let allowed = cluster
        .app()
        .oneshot(
            Request::builder()
                .uri("/api/apps")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}
