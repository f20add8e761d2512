//! Real-time WebSocket API.
//!
//! - `/ws` - authenticated WebSocket endpoint
//! - `/api/voice/rooms` - snapshot of active voice rooms
//! - `/api/realtime/stats` - hub statistics
//!
//! Each socket gets a writer task draining the client's queue and a reader
//! task dispatching inbound frames. Whichever finishes first ends the
//! session, and the client is then unregistered.

use axum::{
    extract::{
        ws::{
            rejection::WebSocketUpgradeRejection, Message, Utf8Bytes, WebSocket, WebSocketUpgrade,
        },
        State,
    },
    http::{header, HeaderMap, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use chirm_realtime::{ClientCommand, EventHub, Frame, UserId};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AppState};
use crate::auth::authenticate;
use crate::observability::METRICS;

/// Create the real-time API routes.
pub fn realtime_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/voice/rooms", get(get_voice_rooms))
        .route("/api/realtime/stats", get(get_stats))
}

/// Whether a WebSocket may be opened from `Origin`.
///
/// Requests without an Origin (non-browser clients) are allowed. With a
/// configured origin only an exact match passes; otherwise the origin must
/// be the request's own host over http or https.
pub fn origin_allowed(headers: &HeaderMap, allowed_origin: Option<&str>) -> bool {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    if let Some(allowed) = allowed_origin {
        return origin == allowed;
    }
    let Some(host) = headers.get(header::HOST).and_then(|h| h.to_str().ok()) else {
        return false;
    };
    origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        == Some(host)
}

/// WebSocket upgrade handler.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade(state, &headers, &uri, ws) {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

fn upgrade(
    state: AppState,
    headers: &HeaderMap,
    uri: &Uri,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let claims = authenticate(state.validator.as_ref(), headers, uri).inspect_err(|e| {
        debug!(error = %e, "WebSocket upgrade rejected");
        METRICS.record_rejection("unauthorized");
    })?;

    if !origin_allowed(headers, state.config.allowed_origin()) {
        warn!(user_id = %claims.user_id, "WebSocket origin rejected");
        METRICS.record_rejection("origin");
        return Err(ApiError::OriginRejected);
    }

    if state.hub.connection_count() >= state.hub.config().max_connections {
        METRICS.record_rejection("capacity");
        return Err(ApiError::AtCapacity);
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let hub = state.hub.clone();
    Ok(ws
        .max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, hub, claims.user_id))
        .into_response())
}

/// Metric label for an inbound command. Unknown tags share one label.
fn command_label(command: &ClientCommand) -> &str {
    match command {
        ClientCommand::Unknown(_) => "unknown",
        other => other.name(),
    }
}

/// A hub frame lent to the socket layer.
struct SharedFrame(Frame);

impl AsRef<[u8]> for SharedFrame {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Wrap a frame as a text message backed by the same allocation.
fn text_message(frame: Frame) -> Message {
    match Utf8Bytes::try_from(Bytes::from_owner(SharedFrame(Frame::clone(&frame)))) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Text(frame.to_string().into()),
    }
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, hub: Arc<EventHub>, user_id: UserId) {
    let (client, mut receiver) = match hub.connect(user_id) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to register client");
            return;
        }
    };
    METRICS.websocket_sessions_total.inc();

    let client_id = client.id.clone();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Writer: ends when the hub closes the queue or the socket fails.
    let writer_id = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = receiver.recv().await {
            if ws_sender.send(text_message(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
        debug!(client_id = %writer_id, "Send task ended");
    });

    // Reader: ends on close, transport error, or once the hub closed the queue.
    let reader_hub = hub.clone();
    let reader_client = client.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            if reader_client.is_queue_closed() {
                debug!(client_id = %reader_client.id, "Queue closed by hub");
                break;
            }
            match msg {
                Ok(Message::Text(text)) => {
                    let text_str: &str = &text;
                    match ClientCommand::decode(text_str) {
                        Ok(command) => {
                            METRICS.record_command(command_label(&command));
                            reader_hub.handle_command(&reader_client, command);
                        }
                        Err(e) => {
                            METRICS.record_command("invalid");
                            debug!(client_id = %reader_client.id, error = %e, "Discarding malformed frame");
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!(client_id = %reader_client.id, "WebSocket close received");
                    break;
                }
                Ok(Message::Binary(_)) => {
                    debug!(client_id = %reader_client.id, "Binary message ignored");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    debug!(client_id = %reader_client.id, error = %e, "WebSocket read error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(&client);
    info!(client_id = %client_id, "WebSocket session ended");
}

/// Voice room snapshot response.
#[derive(Serialize)]
struct VoiceRoomsResponse {
    rooms: BTreeMap<String, Vec<UserId>>,
}

/// Active voice rooms and their members.
async fn get_voice_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(state.validator.as_ref(), &headers, &uri)?;
    Ok(Json(VoiceRoomsResponse {
        rooms: state.hub.voice_rooms(),
    }))
}

/// Get real-time connection statistics.
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_origin_missing_allowed() {
        assert!(origin_allowed(&HeaderMap::new(), None));
        assert!(origin_allowed(&HeaderMap::new(), Some("https://chat.example.com")));
    }

    #[test]
    fn test_origin_same_host() {
        let h = headers(&[
            (header::HOST, "chat.example.com"),
            (header::ORIGIN, "https://chat.example.com"),
        ]);
        assert!(origin_allowed(&h, None));

        let h = headers(&[
            (header::HOST, "chat.example.com:8080"),
            (header::ORIGIN, "http://chat.example.com:8080"),
        ]);
        assert!(origin_allowed(&h, None));

        let h = headers(&[
            (header::HOST, "chat.example.com"),
            (header::ORIGIN, "https://evil.example.net"),
        ]);
        assert!(!origin_allowed(&h, None));
    }

    #[test]
    fn test_origin_configured_exact() {
        let h = headers(&[
            (header::HOST, "internal:8080"),
            (header::ORIGIN, "https://chat.example.com"),
        ]);
        assert!(origin_allowed(&h, Some("https://chat.example.com")));
        assert!(!origin_allowed(&h, Some("https://chat.example.com:443")));
    }

    #[test]
    fn test_text_message_shares_frame() {
        let frame: Frame = Arc::from(r#"{"type":"pong","data":{}}"#);
        match text_message(Frame::clone(&frame)) {
            Message::Text(text) => {
                assert_eq!(text.as_str(), &*frame);
                assert_eq!(text.as_str().as_ptr(), frame.as_ptr());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_command_labels() {
        let known = ClientCommand::decode(r#"{"type":"voice.ice","data":{"channel_id":"c","target_user_id":"u"}}"#).unwrap();
        assert_eq!(command_label(&known), "voice.ice");
        let unknown = ClientCommand::Unknown("x.y".to_string());
        assert_eq!(command_label(&unknown), "unknown");
    }

    proptest::proptest! {
        #[test]
        fn prop_origin_must_match_host(host in "[a-z]{1,12}(\\.[a-z]{2,6})?(:[0-9]{2,5})?") {
            let mut h = HeaderMap::new();
            h.insert(header::HOST, HeaderValue::from_str(&host).unwrap());
            h.insert(header::ORIGIN, HeaderValue::from_str(&format!("https://{host}")).unwrap());
            proptest::prop_assert!(origin_allowed(&h, None));

            h.insert(header::ORIGIN, HeaderValue::from_str(&format!("https://{host}.evil")).unwrap());
            proptest::prop_assert!(!origin_allowed(&h, None));
        }
    }

    #[test]
    fn test_stats_serialization() {
        let hub = EventHub::new();
        let json = serde_json::to_string(&hub.stats()).unwrap();
        assert!(json.contains("\"current_connections\":0"));
        assert!(json.contains("\"signals_dropped\":0"));
    }
}
