//! Client connection management.

use crate::error::RealtimeError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Unique identifier for a connected client.
pub type ClientId = String;

/// Authenticated user identifier.
pub type UserId = String;

/// Text or voice channel identifier.
pub type ChannelId = String;

/// A serialized event, shared by every recipient of one delivery.
pub type Frame = Arc<str>;

/// Default capacity of a client's outbound queue.
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 256;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    /// Created but not yet registered with the hub.
    Connecting = 0,
    /// Registered; reader and writer running.
    Active = 1,
    /// Teardown started by the first closer.
    Closing = 2,
    /// Room cleanup done; terminal.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// A connected WebSocket client.
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier.
    pub id: ClientId,
    /// User this connection was authenticated as.
    pub user_id: UserId,
    /// Channel the client is currently looking at.
    viewed_channel: RwLock<Option<ChannelId>>,
    /// Outbound queue. `None` once closed.
    sender: RwLock<Option<mpsc::Sender<Frame>>>,
    state: AtomicU8,
    /// Connection metadata.
    pub metadata: ClientMetadata,
}

impl Client {
    /// Create a new client with a fresh connection id.
    pub fn new(user_id: impl Into<UserId>, sender: mpsc::Sender<Frame>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), user_id, sender)
    }

    /// Create a new client with an explicit connection id.
    pub fn with_id(
        id: impl Into<ClientId>,
        user_id: impl Into<UserId>,
        sender: mpsc::Sender<Frame>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            viewed_channel: RwLock::new(None),
            sender: RwLock::new(Some(sender)),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            metadata: ClientMetadata::now(),
        }
    }

    /// Enqueue a frame without waiting.
    pub fn send(&self, frame: Frame) -> Result<(), RealtimeError> {
        match self.sender.read().as_ref() {
            Some(tx) => tx.try_send(frame).map_err(|e| match e {
                TrySendError::Full(_) => RealtimeError::QueueFull,
                TrySendError::Closed(_) => RealtimeError::ChannelClosed,
            }),
            None => Err(RealtimeError::ChannelClosed),
        }
    }

    /// Close the outbound queue. Returns `false` if it was already closed.
    ///
    /// Dropping the sender ends the writer's `recv` loop once the frames
    /// already queued have been drained.
    pub fn close_queue(&self) -> bool {
        self.sender.write().take().is_some()
    }

    /// Whether the outbound queue has been closed.
    pub fn is_queue_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Set the viewed channel. An empty id clears it.
    pub fn set_viewed_channel(&self, channel_id: Option<ChannelId>) {
        *self.viewed_channel.write() = channel_id.filter(|c| !c.is_empty());
    }

    /// Currently viewed channel.
    pub fn viewed_channel(&self) -> Option<ChannelId> {
        self.viewed_channel.read().clone()
    }

    /// Whether the client is viewing `channel_id`.
    pub fn is_viewing(&self, channel_id: &str) -> bool {
        self.viewed_channel.read().as_deref() == Some(channel_id)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move `Connecting -> Active`.
    pub fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Enter `Closing`. Only the first caller gets `true`.
    pub fn begin_close(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s < ConnectionState::Closing as u8).then_some(ConnectionState::Closing as u8)
            })
            .is_ok()
    }

    /// Enter the terminal `Closed` state.
    pub fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }
}

/// Metadata about a client connection.
#[derive(Debug, Default)]
pub struct ClientMetadata {
    /// When the client connected (Unix timestamp).
    pub connected_at: u64,
}

impl ClientMetadata {
    /// Create metadata with current timestamp.
    pub fn now() -> Self {
        Self {
            connected_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// Handle for receiving frames from the hub to send to the WebSocket.
pub type ClientReceiver = mpsc::Receiver<Frame>;

/// Create a new client with its frame receiver.
pub fn create_client(user_id: impl Into<UserId>, capacity: usize) -> (Arc<Client>, ClientReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let client = Arc::new(Client::new(user_id, sender));
    (client, receiver)
}
