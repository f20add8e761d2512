//! Event hub for managing WebSocket connections and routing events.

use crate::client::{
    create_client, Client, ClientId, ClientReceiver, ConnectionState, Frame, UserId,
    DEFAULT_SEND_QUEUE_CAPACITY,
};
use crate::command::ClientCommand;
use crate::error::RealtimeError;
use crate::event::{
    EventKind, MediaStateData, RoomStateData, TypingData, VoicePresenceData, WsEvent,
};
use crate::rooms::RoomRegistry;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Maximum number of concurrent connections.
pub const MAX_CONNECTIONS: usize = 10000;

/// Tunables for an [`EventHub`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each client's outbound queue.
    pub send_queue_capacity: usize,
    /// Connections accepted by [`EventHub::connect`] before it refuses.
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            max_connections: MAX_CONNECTIONS,
        }
    }
}

/// Event hub manages all WebSocket connections and event routing.
///
/// The connection set and the room registry each have their own lock.
/// Neither is held while a dead connection is evicted: candidates are
/// collected under the shared lock and removed afterwards through
/// [`EventHub::unregister`], which takes the exclusive one.
///
/// Evicting a room member announces `voice.left`, which can find more dead
/// connections. Those are queued and evicted by the loop already running
/// instead of recursing, so a mass stall costs constant stack depth.
#[derive(Debug)]
pub struct EventHub {
    config: HubConfig,
    /// Connected clients indexed by ID.
    clients: RwLock<HashMap<ClientId, Arc<Client>>>,
    /// Voice room membership.
    rooms: RoomRegistry,
    /// Statistics.
    stats: RwLock<HubStats>,
    /// Dead connections waiting to be evicted.
    pending_evictions: Mutex<Vec<Arc<Client>>>,
    /// Set while one caller is draining `pending_evictions`.
    draining: AtomicBool,
}

impl EventHub {
    /// Create a new event hub.
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with explicit limits.
    pub fn with_config(config: HubConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
            rooms: RoomRegistry::new(),
            stats: RwLock::new(HubStats::default()),
            pending_evictions: Mutex::new(Vec::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Room registry backing this hub.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Create and register a client for `user_id`, returning its frame receiver.
    pub fn connect(
        &self,
        user_id: impl Into<UserId>,
    ) -> Result<(Arc<Client>, ClientReceiver), RealtimeError> {
        let (client, receiver) = create_client(user_id, self.config.send_queue_capacity);
        {
            let mut clients = self.clients.write();
            if clients.len() >= self.config.max_connections {
                warn!(
                    user_id = %client.user_id,
                    max = self.config.max_connections,
                    "Connection refused"
                );
                return Err(RealtimeError::ConnectionLimit(self.config.max_connections));
            }
            clients.insert(client.id.clone(), Arc::clone(&client));
        }
        self.on_registered(&client);
        Ok((client, receiver))
    }

    /// Add an already-built client to the connection set.
    pub fn register(&self, client: &Arc<Client>) {
        self.clients
            .write()
            .insert(client.id.clone(), Arc::clone(client));
        self.on_registered(client);
    }

    fn on_registered(&self, client: &Client) {
        client.activate();
        self.stats.write().total_connections += 1;
        info!(client_id = %client.id, user_id = %client.user_id, "Client connected");
    }

    /// Remove a client, close its queue and leave every room it was in.
    ///
    /// Returns whether the client was in the connection set. Calling this a
    /// second time, or for a client that was never registered, does no harm
    /// and announces nothing new.
    pub fn unregister(&self, client: &Arc<Client>) -> bool {
        let was_registered = self.clients.write().remove(&client.id).is_some();
        client.begin_close();
        client.close_queue();

        let affected = self.rooms.leave_all(&client.id);
        for channel_id in &affected {
            self.announce_left(channel_id, &client.user_id);
        }
        client.mark_closed();

        if was_registered {
            info!(
                client_id = %client.id,
                user_id = %client.user_id,
                rooms_left = affected.len(),
                "Client disconnected"
            );
        }
        was_registered
    }

    /// Get a client by ID.
    pub fn get_client(&self, client_id: &str) -> Option<Arc<Client>> {
        self.clients.read().get(client_id).cloned()
    }

    /// Decode one inbound text frame and dispatch it.
    pub fn handle_text(&self, client: &Arc<Client>, text: &str) -> Result<(), RealtimeError> {
        let command = ClientCommand::decode(text)?;
        self.handle_command(client, command);
        Ok(())
    }

    /// Handle a client command.
    ///
    /// Commands from a connection that is closing are ignored.
    pub fn handle_command(&self, client: &Arc<Client>, command: ClientCommand) {
        if client.state() >= ConnectionState::Closing {
            debug!(
                client_id = %client.id,
                command = command.name(),
                "Ignoring command from closing connection"
            );
            return;
        }
        match command {
            ClientCommand::Subscribe { channel_id } => {
                debug!(client_id = %client.id, channel_id = ?channel_id, "Client subscribed");
                client.set_viewed_channel(channel_id);
            }
            ClientCommand::Typing { channel_id } => {
                let event = WsEvent::new(
                    EventKind::Typing,
                    TypingData {
                        user_id: client.user_id.clone(),
                        channel_id: channel_id.clone(),
                    },
                );
                self.broadcast_to_channel(&channel_id, &event);
            }
            ClientCommand::VoiceJoin { channel_id } => {
                self.join_room(client, &channel_id);
            }
            ClientCommand::VoiceLeave { channel_id } => {
                self.leave_room(client, &channel_id);
            }
            ClientCommand::Signal { kind, data } => {
                self.relay_signal(client, kind, data);
            }
            ClientCommand::VoiceMediaState(state) => {
                if !self.rooms.contains(&state.channel_id, &client.id) {
                    debug!(
                        client_id = %client.id,
                        channel_id = %state.channel_id,
                        "Ignoring media state from non-member"
                    );
                    return;
                }
                let event = WsEvent::new(
                    EventKind::VoiceMediaState,
                    MediaStateData {
                        channel_id: state.channel_id.clone(),
                        from_user_id: client.user_id.clone(),
                        cam_enabled: state.cam_enabled,
                        screen_sharing: state.screen_sharing,
                    },
                );
                self.broadcast_to_room(&state.channel_id, &event, Some(client.id.as_str()));
            }
            ClientCommand::Ping => {
                self.send_to_client(client, &WsEvent::new(EventKind::Pong, serde_json::json!({})));
            }
            ClientCommand::Unknown(tag) => {
                debug!(client_id = %client.id, tag = %tag, "Ignoring unknown command");
            }
        }
    }

    /// Join a voice room and announce it.
    ///
    /// The joiner gets `voice.room_state` with the users already present;
    /// everyone else in the room, and then every connection, gets
    /// `voice.joined`.
    ///
    /// A closed connection is not added, and nothing is announced for it.
    pub fn join_room(&self, client: &Arc<Client>, channel_id: &str) -> Vec<UserId> {
        let Some(participants) = self.rooms.join(channel_id, client) else {
            debug!(
                client_id = %client.id,
                channel_id = %channel_id,
                "Refusing join from closed connection"
            );
            return Vec::new();
        };
        info!(
            client_id = %client.id,
            user_id = %client.user_id,
            channel_id = %channel_id,
            existing = participants.len(),
            "Joined voice room"
        );

        let delivered = self.send_to_client(
            client,
            &WsEvent::new(
                EventKind::VoiceRoomState,
                RoomStateData {
                    channel_id: channel_id.to_string(),
                    participants: participants.clone(),
                },
            ),
        );
        // The joiner was evicted by that send and has already left again.
        if !delivered && client.state() >= ConnectionState::Closing {
            return participants;
        }

        let joined = WsEvent::new(
            EventKind::VoiceJoined,
            VoicePresenceData {
                channel_id: channel_id.to_string(),
                user_id: client.user_id.clone(),
            },
        );
        self.broadcast_to_room(channel_id, &joined, Some(client.id.as_str()));
        self.broadcast_global(&joined);
        participants
    }

    /// Leave a voice room. Announces `voice.left` only if the client was in it.
    pub fn leave_room(&self, client: &Arc<Client>, channel_id: &str) -> bool {
        if !self.rooms.leave(channel_id, &client.id) {
            return false;
        }
        info!(client_id = %client.id, channel_id = %channel_id, "Left voice room");
        self.announce_left(channel_id, &client.user_id);
        true
    }

    fn announce_left(&self, channel_id: &str, user_id: &str) {
        let left = WsEvent::new(
            EventKind::VoiceLeft,
            VoicePresenceData {
                channel_id: channel_id.to_string(),
                user_id: user_id.to_string(),
            },
        );
        self.broadcast_to_room(channel_id, &left, None);
        self.broadcast_global(&left);
    }

    /// Send to every registered connection.
    pub fn broadcast_global<T: Serialize>(&self, event: &WsEvent<T>) -> usize {
        self.broadcast_where(event, |_| true)
    }

    /// Send to connections currently viewing `channel_id`.
    pub fn broadcast_to_channel<T: Serialize>(&self, channel_id: &str, event: &WsEvent<T>) -> usize {
        self.broadcast_where(event, |c| c.is_viewing(channel_id))
    }

    /// Send to every connection of `user_id`.
    pub fn send_to_user<T: Serialize>(&self, user_id: &str, event: &WsEvent<T>) -> usize {
        self.broadcast_where(event, |c| c.user_id == user_id)
    }

    /// Send to the members of a voice room, optionally skipping one connection.
    pub fn broadcast_to_room<T: Serialize>(
        &self,
        channel_id: &str,
        event: &WsEvent<T>,
        exclude: Option<&str>,
    ) -> usize {
        let Some(frame) = serialize(event) else {
            return 0;
        };
        let members = self.rooms.members(channel_id);
        let targets = members
            .iter()
            .filter(|c| exclude != Some(c.id.as_str()));
        let (delivered, dead) = push_frame(targets, &frame);
        self.finish_delivery(event.kind, delivered, dead)
    }

    /// Send directly to one connection.
    pub fn send_to_client<T: Serialize>(&self, client: &Arc<Client>, event: &WsEvent<T>) -> bool {
        let Some(frame) = serialize(event) else {
            return false;
        };
        let (delivered, dead) = push_frame(std::iter::once(client), &frame);
        self.finish_delivery(event.kind, delivered, dead) == 1
    }

    fn broadcast_where<T, F>(&self, event: &WsEvent<T>, filter: F) -> usize
    where
        T: Serialize,
        F: Fn(&Arc<Client>) -> bool,
    {
        let Some(frame) = serialize(event) else {
            return 0;
        };
        let (delivered, dead) = {
            let clients = self.clients.read();
            push_frame(clients.values().filter(|&c| filter(c)), &frame)
        };
        self.finish_delivery(event.kind, delivered, dead)
    }

    fn finish_delivery(&self, kind: EventKind, delivered: usize, dead: Vec<Arc<Client>>) -> usize {
        self.stats.write().total_events += 1;
        debug!(event = %kind, recipients = delivered, dead = dead.len(), "Event delivered");
        if !dead.is_empty() {
            self.pending_evictions.lock().extend(dead);
            self.drain_evictions();
        }
        delivered
    }

    /// Evict queued dead connections.
    ///
    /// Only one caller runs the loop at a time. Deliveries made while it runs,
    /// on this thread or another, just queue their dead connections for it.
    fn drain_evictions(&self) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            loop {
                let next = self.pending_evictions.lock().pop();
                let Some(client) = next else {
                    break;
                };
                self.evict(&client);
            }
            self.draining.store(false, Ordering::Release);
            // Entries queued after the last pop but before the flag was
            // cleared would otherwise wait for the next eviction.
            if self.pending_evictions.lock().is_empty() {
                return;
            }
        }
    }

    fn evict(&self, client: &Arc<Client>) {
        if self.unregister(client) {
            warn!(
                client_id = %client.id,
                user_id = %client.user_id,
                "Evicted connection that stopped draining"
            );
            self.stats.write().evicted_connections += 1;
        }
    }

    pub(crate) fn record_signal(&self, forwarded: bool) {
        let mut stats = self.stats.write();
        if forwarded {
            stats.signals_relayed += 1;
        } else {
            stats.signals_dropped += 1;
        }
    }

    /// Active voice rooms and their users.
    pub fn voice_rooms(&self) -> BTreeMap<String, Vec<UserId>> {
        self.rooms.snapshot()
    }

    /// Get current connection count.
    pub fn connection_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Get hub statistics.
    pub fn stats(&self) -> HubStats {
        let mut stats = self.stats.read().clone();
        stats.current_connections = self.connection_count();
        stats.active_rooms = self.rooms.room_count();
        stats
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize<T: Serialize>(event: &WsEvent<T>) -> Option<Frame> {
    match event.to_frame() {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(event = %event.kind, error = %e, "Failed to serialize event");
            None
        }
    }
}

/// Enqueue without blocking.
///
/// Closing connections are skipped. A connection that refuses the frame is
/// moved to `Closing` and returned for eviction; only the caller that moved
/// it gets it back, so each dead connection is queued once.
fn push_frame<'a, I>(targets: I, frame: &Frame) -> (usize, Vec<Arc<Client>>)
where
    I: Iterator<Item = &'a Arc<Client>>,
{
    let mut delivered = 0;
    let mut dead = Vec::new();
    for client in targets {
        if client.state() >= ConnectionState::Closing {
            continue;
        }
        match client.send(Arc::clone(frame)) {
            Ok(()) => delivered += 1,
            Err(e) => {
                debug!(client_id = %client.id, error = %e, "Send failed");
                if client.begin_close() {
                    dead.push(Arc::clone(client));
                }
            }
        }
    }
    (delivered, dead)
}

/// Hub statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubStats {
    /// Current number of connections.
    pub current_connections: usize,
    /// Total connections since start.
    pub total_connections: u64,
    /// Total delivery calls since start.
    pub total_events: u64,
    /// Connections removed because their queue was full or closed.
    pub evicted_connections: u64,
    /// Voice rooms with at least one member.
    pub active_rooms: usize,
    /// Signaling messages forwarded to a co-member.
    pub signals_relayed: u64,
    /// Signaling messages dropped by the co-membership check.
    pub signals_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn drain(rx: &mut ClientReceiver) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    fn of_type<'a>(events: &'a [Value], tag: &str) -> Vec<&'a Value> {
        events.iter().filter(|e| e["type"] == tag).collect()
    }

    fn command(text: &str) -> ClientCommand {
        ClientCommand::decode(text).unwrap()
    }

    #[tokio::test]
    async fn test_hub_connect() {
        let hub = EventHub::new();
        let (client, _rx) = hub.connect("u1").unwrap();

        assert!(!client.id.is_empty());
        assert_eq!(client.state(), crate::ConnectionState::Active);
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_hub_connection_limit() {
        let hub = EventHub::with_config(HubConfig {
            max_connections: 1,
            ..HubConfig::default()
        });
        let _first = hub.connect("u1").unwrap();
        assert!(matches!(
            hub.connect("u2"),
            Err(RealtimeError::ConnectionLimit(1))
        ));
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_hub_unregister_idempotent() {
        let hub = EventHub::new();
        let (client, mut rx) = hub.connect("u1").unwrap();
        let (_observer, mut orx) = hub.connect("u2").unwrap();
        hub.join_room(&client, "gv");
        drain(&mut orx);

        assert!(hub.unregister(&client));
        assert!(!hub.unregister(&client));
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(client.state(), crate::ConnectionState::Closed);
        assert!(client.is_queue_closed());

        assert_eq!(of_type(&drain(&mut orx), "voice.left").len(), 1);
        drain(&mut rx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unregister_never_registered() {
        let hub = EventHub::new();
        let (client, _rx) = create_client("ghost", 4);
        assert!(!hub.unregister(&client));
        assert!(client.is_queue_closed());
    }

    #[tokio::test]
    async fn test_subscribe_and_channel_isolation() {
        let hub = EventHub::new();
        let (a, mut rx_a) = hub.connect("u1").unwrap();
        let (b, mut rx_b) = hub.connect("u2").unwrap();
        let (_idle, mut rx_idle) = hub.connect("u3").unwrap();

        hub.handle_command(&a, command(r#"{"type":"subscribe","data":{"channel_id":"A"}}"#));
        hub.handle_command(&b, command(r#"{"type":"subscribe","data":{"channel_id":"B"}}"#));

        let event = WsEvent::new(EventKind::MessageNew, serde_json::json!({"id": "m1"}));
        assert_eq!(hub.broadcast_to_channel("B", &event), 1);

        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_idle).is_empty());
        let got = drain(&mut rx_b);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["data"]["id"], "m1");
    }

    #[tokio::test]
    async fn test_broadcast_global_exactly_once() {
        let hub = EventHub::new();
        let mut receivers: Vec<_> = (0..5)
            .map(|i| hub.connect(format!("u{}", i)).unwrap().1)
            .collect();

        let event = WsEvent::new(EventKind::ChannelNew, serde_json::json!({"id": "c1"}));
        assert_eq!(hub.broadcast_global(&event), 5);
        for rx in receivers.iter_mut() {
            assert_eq!(drain(rx).len(), 1);
        }
    }

    #[tokio::test]
    async fn test_send_to_user_reaches_every_device() {
        let hub = EventHub::new();
        let (_tab1, mut rx1) = hub.connect("u1").unwrap();
        let (_tab2, mut rx2) = hub.connect("u1").unwrap();
        let (_other, mut rx3) = hub.connect("u2").unwrap();

        let event = WsEvent::new(EventKind::Pong, serde_json::json!({}));
        assert_eq!(hub.send_to_user("u1", &event), 2);
        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
        assert!(drain(&mut rx3).is_empty());
    }

    #[tokio::test]
    async fn test_typing_reaches_channel_viewers() {
        let hub = EventHub::new();
        let (a, mut rx_a) = hub.connect("u1").unwrap();
        let (b, mut rx_b) = hub.connect("u2").unwrap();
        hub.handle_command(&b, command(r#"{"type":"subscribe","data":{"channel_id":"general"}}"#));

        hub.handle_command(&a, command(r#"{"type":"typing","data":{"channel_id":"general"}}"#));
        assert!(drain(&mut rx_a).is_empty());
        let got = drain(&mut rx_b);
        assert_eq!(got[0]["type"], "typing");
        assert_eq!(got[0]["data"]["user_id"], "u1");
    }

    #[tokio::test]
    async fn test_stalled_connection_is_evicted() {
        let hub = EventHub::with_config(HubConfig {
            send_queue_capacity: 1,
            ..HubConfig::default()
        });
        let (_a, mut rx_a) = hub.connect("u1").unwrap();
        let (_b, mut rx_b) = hub.connect("u2").unwrap();
        let (stalled, _rx_stalled) = hub.connect("u3").unwrap();

        let event = WsEvent::new(EventKind::EmojiNew, serde_json::json!({}));
        assert_eq!(hub.broadcast_global(&event), 3);
        drain(&mut rx_a);
        drain(&mut rx_b);

        assert_eq!(hub.broadcast_global(&event), 2);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert!(hub.get_client(&stalled.id).is_none());
        assert_eq!(hub.connection_count(), 2);
        assert_eq!(hub.stats().evicted_connections, 1);
    }

    #[tokio::test]
    async fn test_evicted_member_leaves_room() {
        let hub = EventHub::with_config(HubConfig {
            send_queue_capacity: 4,
            ..HubConfig::default()
        });
        let (stalled, _rx) = hub.connect("u1").unwrap();
        hub.join_room(&stalled, "gv");
        // room_state + voice.joined leave two free slots.
        let event = WsEvent::new(EventKind::EmojiNew, serde_json::json!({}));
        hub.broadcast_global(&event);
        hub.broadcast_global(&event);
        assert_eq!(hub.broadcast_global(&event), 0);

        assert_eq!(hub.connection_count(), 0);
        assert!(hub.voice_rooms().is_empty());
    }

    #[test]
    fn test_mass_stall_evicts_without_recursion() {
        const STALLED: usize = 3000;

        // A small stack fails fast if eviction ever nests per connection.
        let handle = std::thread::Builder::new()
            .stack_size(512 * 1024)
            .spawn(|| {
                let hub = EventHub::with_config(HubConfig {
                    send_queue_capacity: 1,
                    ..HubConfig::default()
                });
                let mut receivers = Vec::with_capacity(STALLED);
                for i in 0..STALLED {
                    let (client, rx) = hub.connect(format!("u{i}")).unwrap();
                    hub.rooms().join("gv", &client);
                    client.send(Arc::from("{}")).unwrap();
                    receivers.push(rx);
                }

                let event = WsEvent::new(EventKind::EmojiNew, serde_json::json!({}));
                assert_eq!(hub.broadcast_global(&event), 0);

                let stats = hub.stats();
                assert_eq!(stats.evicted_connections, STALLED as u64);
                assert_eq!(stats.current_connections, 0);
                assert_eq!(stats.active_rooms, 0);
                drop(receivers);
            })
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_closed_connection_commands_are_ignored() {
        let hub = EventHub::new();
        let (gone, _rx_gone) = hub.connect("u1").unwrap();
        let (observer, mut rx) = hub.connect("u2").unwrap();
        hub.handle_command(
            &gone,
            command(r#"{"type":"subscribe","data":{"channel_id":"general"}}"#),
        );
        hub.handle_command(
            &observer,
            command(r#"{"type":"subscribe","data":{"channel_id":"general"}}"#),
        );

        hub.unregister(&gone);
        drain(&mut rx);

        hub.handle_command(&gone, command(r#"{"type":"voice.join","data":{"channel_id":"gv"}}"#));
        hub.handle_command(&gone, command(r#"{"type":"typing","data":{"channel_id":"general"}}"#));

        assert!(drain(&mut rx).is_empty());
        assert!(hub.voice_rooms().is_empty());
    }

    #[test]
    fn test_joiner_evicted_by_room_state_is_not_announced() {
        let hub = EventHub::with_config(HubConfig {
            send_queue_capacity: 1,
            ..HubConfig::default()
        });
        let (stalled, _rx_stalled) = hub.connect("u1").unwrap();
        stalled.send(Arc::from("{}")).unwrap();
        let (observer, mut rx) = create_client("u2", 16);
        hub.register(&observer);

        hub.join_room(&stalled, "gv");

        let events = drain(&mut rx);
        assert!(of_type(&events, "voice.joined").is_empty());
        assert!(hub.voice_rooms().is_empty());
        assert_eq!(hub.stats().evicted_connections, 1);
    }

    #[test]
    fn test_concurrent_unregister_and_eviction_clean_up_once() {
        for _ in 0..50 {
            let hub = EventHub::with_config(HubConfig {
                send_queue_capacity: 1,
                ..HubConfig::default()
            });
            let (stalled, _rx_stalled) = hub.connect("u1").unwrap();
            let (observer, mut rx) = create_client("u2", 64);
            hub.register(&observer);
            hub.rooms().join("gv", &stalled);
            hub.rooms().join("gv", &observer);
            stalled.send(Arc::from("{}")).unwrap();

            let barrier = std::sync::Barrier::new(2);
            let event = WsEvent::new(EventKind::EmojiNew, serde_json::json!({}));
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    hub.unregister(&stalled);
                });
                scope.spawn(|| {
                    barrier.wait();
                    hub.broadcast_global(&event);
                });
            });

            let events = drain(&mut rx);
            let left: Vec<_> = of_type(&events, "voice.left")
                .into_iter()
                .filter(|e| e["data"]["user_id"] == "u1")
                .collect();
            // One announcement: a room copy and a global copy.
            assert_eq!(left.len(), 2);
            assert!(hub.stats().evicted_connections <= 1);
            assert_eq!(hub.connection_count(), 1);
            assert_eq!(hub.voice_rooms()["gv"], vec!["u2".to_string()]);
            assert_eq!(stalled.state(), crate::ConnectionState::Closed);
        }
    }

    #[tokio::test]
    async fn test_scenario_join_room_state() {
        let hub = EventHub::new();
        let (c1, mut rx1) = hub.connect("U1").unwrap();
        let (c2, mut rx2) = hub.connect("U2").unwrap();

        hub.handle_command(
            &c1,
            command(r#"{"type":"voice.join","data":{"channel_id":"general-voice"}}"#),
        );
        hub.handle_command(
            &c2,
            command(r#"{"type":"voice.join","data":{"channel_id":"general-voice"}}"#),
        );

        let e1 = drain(&mut rx1);
        let e2 = drain(&mut rx2);

        let state1 = of_type(&e1, "voice.room_state");
        assert_eq!(state1.len(), 1);
        assert_eq!(state1[0]["data"]["participants"], serde_json::json!([]));

        let state2 = of_type(&e2, "voice.room_state");
        assert_eq!(state2[0]["data"]["participants"], serde_json::json!(["U1"]));

        assert!(of_type(&e1, "voice.joined")
            .iter()
            .any(|e| e["data"]["user_id"] == "U2"));
        assert!(of_type(&e2, "voice.joined")
            .iter()
            .any(|e| e["data"]["user_id"] == "U1"));
    }

    #[tokio::test]
    async fn test_voice_leave_only_when_present() {
        let hub = EventHub::new();
        let (c1, _rx1) = hub.connect("u1").unwrap();
        let (_obs, mut orx) = hub.connect("u2").unwrap();

        hub.handle_command(&c1, command(r#"{"type":"voice.leave","data":{"channel_id":"gv"}}"#));
        assert!(of_type(&drain(&mut orx), "voice.left").is_empty());

        hub.join_room(&c1, "gv");
        hub.handle_command(&c1, command(r#"{"type":"voice.leave","data":{"channel_id":"gv"}}"#));
        assert_eq!(of_type(&drain(&mut orx), "voice.left").len(), 1);
        assert_eq!(hub.stats().active_rooms, 0);
    }

    #[tokio::test]
    async fn test_scenario_disconnect_from_two_rooms() {
        let hub = EventHub::new();
        let (c1, _rx1) = hub.connect("U1").unwrap();
        let (_obs, mut orx) = hub.connect("U9").unwrap();
        hub.join_room(&c1, "R1");
        hub.join_room(&c1, "R2");
        drain(&mut orx);

        hub.unregister(&c1);

        let left = drain(&mut orx);
        let left = of_type(&left, "voice.left");
        assert_eq!(left.len(), 2);
        let mut rooms: Vec<_> = left
            .iter()
            .map(|e| e["data"]["channel_id"].as_str().unwrap().to_string())
            .collect();
        rooms.sort();
        assert_eq!(rooms, vec!["R1", "R2"]);
        assert!(hub.voice_rooms().is_empty());
    }

    #[tokio::test]
    async fn test_media_state_fan_out() {
        let hub = EventHub::new();
        let (c1, mut rx1) = hub.connect("U1").unwrap();
        let (c2, mut rx2) = hub.connect("U2").unwrap();
        let (outsider, _rx3) = hub.connect("U3").unwrap();
        hub.join_room(&c1, "gv");
        hub.join_room(&c2, "gv");
        drain(&mut rx1);
        drain(&mut rx2);

        let text = r#"{"type":"voice.media_state","data":{"channel_id":"gv","cam_enabled":true,"screen_sharing":false}}"#;
        hub.handle_command(&c1, command(text));
        assert!(drain(&mut rx1).is_empty());
        let got = drain(&mut rx2);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["type"], "voice.media_state");
        assert_eq!(got[0]["data"]["from_user_id"], "U1");
        assert_eq!(got[0]["data"]["cam_enabled"], true);

        hub.handle_command(&outsider, command(text));
        assert!(drain(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let hub = EventHub::new();
        let (client, mut rx) = hub.connect("u1").unwrap();
        hub.handle_text(&client, r#"{"type":"ping"}"#).unwrap();
        assert_eq!(drain(&mut rx)[0]["type"], "pong");
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection() {
        let hub = EventHub::new();
        let (client, _rx) = hub.connect("u1").unwrap();
        assert!(hub.handle_text(&client, "{{{").is_err());
        assert!(hub.handle_text(&client, r#"{"type":"whatever"}"#).is_ok());
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_hub_stats() {
        let hub = EventHub::new();
        let (client, _rx) = hub.connect("u1").unwrap();
        hub.join_room(&client, "gv");

        let stats = hub.stats();
        assert_eq!(stats.current_connections, 1);
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.active_rooms, 1);
        // room_state, joined to room, joined globally
        assert_eq!(stats.total_events, 3);
    }
}
