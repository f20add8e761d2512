//! # Chirm Real-time
//!
//! In-process event hub for the Chirm chat server.
//!
//! This crate owns every live WebSocket connection, routes events to the right
//! audience and relays WebRTC signaling between members of a voice room.
//!
//! ## Features
//!
//! - **Event Hub**: connection set plus four delivery patterns (global,
//!   channel viewers, one user's devices, voice room members)
//! - **Room Registry**: voice room membership with inline pruning
//! - **Signaling Relay**: offers, answers and ICE candidates gated on room
//!   co-membership
//! - **Publishing**: typed entry points for the REST layer (`message.new`,
//!   `reaction.update`, roster changes)
//!
//! Delivery never waits on a client. Each connection has a bounded queue; a
//! connection whose queue is full is treated as dead and evicted, which also
//! removes it from every voice room.
//!
//! ## Example
//!
//! ```rust
//! use chirm_realtime::EventHub;
//!
//! let hub = EventHub::new();
//! let (alice, _alice_rx) = hub.connect("alice").unwrap();
//! let (bob, mut bob_rx) = hub.connect("bob").unwrap();
//!
//! hub.handle_text(&alice, r#"{"type":"voice.join","data":{"channel_id":"lounge"}}"#).unwrap();
//! hub.handle_text(&bob, r#"{"type":"voice.join","data":{"channel_id":"lounge"}}"#).unwrap();
//!
//! // Bob learns that alice is already in the room.
//! let frames: Vec<_> = std::iter::from_fn(|| bob_rx.try_recv().ok()).collect();
//! assert!(frames.iter().any(|f| f.contains(r#""participants":["alice"]"#)));
//! assert_eq!(hub.voice_rooms()["lounge"], vec!["alice", "bob"]);
//! ```
//!
//! ## WebSocket Protocol
//!
//! Every frame is `{"type": <tag>, "data": <object>}`.
//!
//! ### Client -> Server Messages
//!
//! ```json
//! {"type": "subscribe", "data": {"channel_id": "general"}}
//! {"type": "typing", "data": {"channel_id": "general"}}
//! {"type": "voice.join", "data": {"channel_id": "lounge"}}
//! {"type": "voice.leave", "data": {"channel_id": "lounge"}}
//! {"type": "voice.offer", "data": {"channel_id": "lounge", "target_user_id": "bob", "payload": {...}}}
//! {"type": "voice.media_state", "data": {"channel_id": "lounge", "cam_enabled": true, "screen_sharing": false}}
//! {"type": "ping"}
//! ```
//!
//! ### Server -> Client Messages
//!
//! ```json
//! {"type": "voice.room_state", "data": {"channel_id": "lounge", "participants": ["alice"]}}
//! {"type": "voice.joined", "data": {"channel_id": "lounge", "user_id": "bob"}}
//! {"type": "voice.offer", "data": {"channel_id": "lounge", "from_user_id": "alice", "payload": {...}}}
//! {"type": "message.activity", "data": {"channel_id": "c1", "preview": "hi", ...}}
//! {"type": "pong", "data": {}}
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   EventHub                      │
//! │  ┌──────────────────────┐  ┌───────────────┐    │
//! │  │ Clients (RwLock)     │  │ RoomRegistry  │    │
//! │  │ client_id -> Client  │  │ (RwLock)      │    │
//! │  │  └─> viewed channel  │  │ channel_id -> │    │
//! │  │  └─> bounded queue   │  │  client_id -> │    │
//! │  └──────────┬───────────┘  │    Client     │    │
//! │             │ try_send     └───────┬───────┘    │
//! │             ▼                      │ co-member  │
//! │      writer task per client   signaling relay   │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod command;
pub mod error;
pub mod event;
pub mod hub;
pub mod publish;
pub mod rooms;
pub mod signaling;

// Re-export main types
pub use client::{
    create_client, ChannelId, Client, ClientId, ClientReceiver, ConnectionState, Frame, UserId,
    DEFAULT_SEND_QUEUE_CAPACITY,
};
pub use command::{ClientCommand, MediaStateCommand, SignalData, SignalKind};
pub use error::RealtimeError;
pub use event::{
    EventKind, MediaStateData, MemberData, MessageActivity, MessageDeleteData, RoomStateData,
    SignalRelayData, TypingData, VoicePresenceData, WsEvent,
};
pub use hub::{EventHub, HubConfig, HubStats, MAX_CONNECTIONS};
pub use publish::{preview, PREVIEW_CHARS};
pub use rooms::RoomRegistry;
pub use signaling::RelayOutcome;
