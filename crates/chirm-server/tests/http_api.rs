//! HTTP endpoint tests driven through the router without a socket.

use axum::{body::Body, http::Request};
use chirm_server::api::{create_router, AppState};
use chirm_server::auth::Claims;
use chirm_server::config::ServerConfig;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;

const SECRET: &str = "integration-secret-0123456789abcdef";

fn create_test_state() -> AppState {
    let config = ServerConfig {
        jwt_secret: SECRET.to_string(),
        allowed_origin: Some("https://chat.example.com".to_string()),
        ..ServerConfig::default()
    };
    let state = AppState::new(config);
    state.health.set_ready(true);
    state
}

fn token_for(user_id: &str) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = Claims {
        user_id: user_id.to_string(),
        username: user_id.to_string(),
        is_owner: false,
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ==================== Voice Rooms ====================

#[tokio::test]
async fn test_voice_rooms_requires_token() {
    let app = create_router(create_test_state());

    let response = app.oneshot(get("/api/voice/rooms")).await.unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(json_body(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn test_voice_rooms_rejects_bad_token() {
    let app = create_router(create_test_state());

    let request = Request::builder()
        .uri("/api/voice/rooms")
        .header("authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(json_body(response).await["error"], "invalid token");
}

#[tokio::test]
async fn test_voice_rooms_snapshot() {
    let state = create_test_state();
    let app = create_router(state.clone());

    let (alice, _rx_a) = state.hub.connect("alice").unwrap();
    let (alice_phone, _rx_p) = state.hub.connect("alice").unwrap();
    let (bob, _rx_b) = state.hub.connect("bob").unwrap();
    state.hub.join_room(&bob, "lounge");
    state.hub.join_room(&alice, "lounge");
    state.hub.join_room(&alice_phone, "lounge");
    state.hub.join_room(&bob, "standup");

    let request = Request::builder()
        .uri("/api/voice/rooms")
        .header("cookie", format!("chirm_token={}", token_for("carol")))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = json_body(response).await;
    assert_eq!(body["rooms"]["lounge"], serde_json::json!(["alice", "bob"]));
    assert_eq!(body["rooms"]["standup"], serde_json::json!(["bob"]));
}

#[tokio::test]
async fn test_voice_rooms_empty() {
    let app = create_router(create_test_state());

    let uri = format!("/api/voice/rooms?token={}", token_for("alice"));
    let response = app.oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(json_body(response).await, serde_json::json!({ "rooms": {} }));
}

// ==================== WebSocket Upgrade ====================

#[tokio::test]
async fn test_ws_requires_token() {
    let app = create_router(create_test_state());

    let response = app.oneshot(get("/ws")).await.unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_ws_rejects_foreign_origin() {
    let state = create_test_state();
    let app = create_router(state.clone());

    let request = Request::builder()
        .uri("/ws")
        .header("authorization", format!("Bearer {}", token_for("alice")))
        .header("origin", "https://evil.example.net")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(state.hub.connection_count(), 0);
}

#[tokio::test]
async fn test_ws_authenticated_plain_request_is_not_upgraded() {
    let state = create_test_state();
    let app = create_router(state.clone());

    let request = Request::builder()
        .uri("/ws")
        .header("authorization", format!("Bearer {}", token_for("alice")))
        .header("origin", "https://chat.example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
    assert_ne!(response.status(), 401);
    assert_ne!(response.status(), 403);
    assert_eq!(state.hub.connection_count(), 0);
}

// ==================== Stats, Health, Metrics ====================

#[tokio::test]
async fn test_realtime_stats() {
    let state = create_test_state();
    let app = create_router(state.clone());
    let (_client, _rx) = state.hub.connect("alice").unwrap();

    let response = app.oneshot(get("/api/realtime/stats")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = json_body(response).await;
    assert_eq!(body["current_connections"], 1);
    assert_eq!(body["total_connections"], 1);
    assert_eq!(body["active_rooms"], 0);
}

#[tokio::test]
async fn test_health_endpoints() {
    let state = create_test_state();
    let app = create_router(state.clone());

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body = json_body(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["checks"]["realtime"]["status"], "up");

    let response = app.clone().oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), 200);

    state.health.set_ready(false);
    let response = app.oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_router(create_test_state());

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("chirm_websocket_connections"));
}

#[tokio::test]
async fn test_request_id_echoed() {
    let app = create_router(create_test_state());

    let request = Request::builder()
        .uri("/health/live")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}
