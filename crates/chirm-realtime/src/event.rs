//! Server-to-client event types.

use crate::client::{ChannelId, Frame, UserId};
use crate::error::RealtimeError;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Every event tag the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    // Voice rooms
    /// Roster sent to a client that just joined a room.
    #[serde(rename = "voice.room_state")]
    VoiceRoomState,
    /// A user joined a voice room.
    #[serde(rename = "voice.joined")]
    VoiceJoined,
    /// A user left a voice room.
    #[serde(rename = "voice.left")]
    VoiceLeft,
    /// Relayed SDP offer.
    #[serde(rename = "voice.offer")]
    VoiceOffer,
    /// Relayed SDP answer.
    #[serde(rename = "voice.answer")]
    VoiceAnswer,
    /// Relayed ICE candidate.
    #[serde(rename = "voice.ice")]
    VoiceIce,
    /// Camera or screen-share toggled.
    #[serde(rename = "voice.media_state")]
    VoiceMediaState,

    // Presence
    /// A user is typing in a channel.
    #[serde(rename = "typing")]
    Typing,
    /// Keepalive reply.
    #[serde(rename = "pong")]
    Pong,

    // Messages
    /// Full message payload, channel viewers only.
    #[serde(rename = "message.new")]
    MessageNew,
    /// Message edited.
    #[serde(rename = "message.edit")]
    MessageEdit,
    /// Message deleted.
    #[serde(rename = "message.delete")]
    MessageDelete,
    /// Lightweight digest of a new message, sent to everyone.
    #[serde(rename = "message.activity")]
    MessageActivity,
    /// Recomputed reaction list for a message.
    #[serde(rename = "reaction.update")]
    ReactionUpdate,

    // Server roster
    /// Channel created.
    #[serde(rename = "channel.new")]
    ChannelNew,
    /// Channel renamed or otherwise changed.
    #[serde(rename = "channel.update")]
    ChannelUpdate,
    /// Channel deleted.
    #[serde(rename = "channel.delete")]
    ChannelDelete,
    /// Channel order changed.
    #[serde(rename = "channels.reorder")]
    ChannelsReorder,
    /// Category created.
    #[serde(rename = "category.new")]
    CategoryNew,
    /// Category list changed.
    #[serde(rename = "categories.update")]
    CategoriesUpdate,
    /// Category deleted.
    #[serde(rename = "category.delete")]
    CategoryDelete,
    /// Custom emoji added.
    #[serde(rename = "emoji.new")]
    EmojiNew,
    /// Custom emoji removed.
    #[serde(rename = "emoji.delete")]
    EmojiDelete,
    /// A new member registered.
    #[serde(rename = "member.new")]
    MemberNew,
}

impl EventKind {
    /// Wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VoiceRoomState => "voice.room_state",
            Self::VoiceJoined => "voice.joined",
            Self::VoiceLeft => "voice.left",
            Self::VoiceOffer => "voice.offer",
            Self::VoiceAnswer => "voice.answer",
            Self::VoiceIce => "voice.ice",
            Self::VoiceMediaState => "voice.media_state",
            Self::Typing => "typing",
            Self::Pong => "pong",
            Self::MessageNew => "message.new",
            Self::MessageEdit => "message.edit",
            Self::MessageDelete => "message.delete",
            Self::MessageActivity => "message.activity",
            Self::ReactionUpdate => "reaction.update",
            Self::ChannelNew => "channel.new",
            Self::ChannelUpdate => "channel.update",
            Self::ChannelDelete => "channel.delete",
            Self::ChannelsReorder => "channels.reorder",
            Self::CategoryNew => "category.new",
            Self::CategoriesUpdate => "categories.update",
            Self::CategoryDelete => "category.delete",
            Self::EmojiNew => "emoji.new",
            Self::EmojiDelete => "emoji.delete",
            Self::MemberNew => "member.new",
        }
    }

    /// Whether this kind is a server roster change broadcast to everyone.
    pub fn is_server_wide(&self) -> bool {
        matches!(
            self,
            Self::ChannelNew
                | Self::ChannelUpdate
                | Self::ChannelDelete
                | Self::ChannelsReorder
                | Self::CategoryNew
                | Self::CategoriesUpdate
                | Self::CategoryDelete
                | Self::EmojiNew
                | Self::EmojiDelete
                | Self::MemberNew
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `{type, data}` envelope every frame uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEvent<T = serde_json::Value> {
    /// Event tag.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Tag-specific payload.
    pub data: T,
}

impl<T: Serialize> WsEvent<T> {
    /// Create a new event.
    pub fn new(kind: EventKind, data: T) -> Self {
        Self { kind, data }
    }

    /// Serialize once into a shareable frame.
    pub fn to_frame(&self) -> Result<Frame, RealtimeError> {
        Ok(Frame::from(serde_json::to_string(self)?))
    }
}

/// Data for `voice.room_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStateData {
    pub channel_id: ChannelId,
    pub participants: Vec<UserId>,
}

/// Data for `voice.joined` and `voice.left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoicePresenceData {
    pub channel_id: ChannelId,
    pub user_id: UserId,
}

/// Data for relayed `voice.offer`, `voice.answer` and `voice.ice`.
///
/// `payload` is kept as raw JSON so the SDP or candidate reaches the peer
/// exactly as the sender wrote it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRelayData {
    pub channel_id: ChannelId,
    pub from_user_id: UserId,
    pub payload: Option<Box<RawValue>>,
}

/// Data for relayed `voice.media_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStateData {
    pub channel_id: ChannelId,
    pub from_user_id: UserId,
    pub cam_enabled: bool,
    pub screen_sharing: bool,
}

/// Data for `typing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingData {
    pub user_id: UserId,
    pub channel_id: ChannelId,
}

/// Data for `message.delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeleteData {
    pub id: String,
    pub channel_id: ChannelId,
}

/// Data for `message.activity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageActivity {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub author_id: UserId,
    pub author: String,
    pub preview: String,
    pub message_id: String,
}

/// Payload of `member.new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberData {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}
