//! Client-to-server commands.
//!
//! Frames are decoded in two steps: the `{type, data}` envelope first, then
//! `data` into the struct that belongs to the tag. Unknown tags decode to
//! [`ClientCommand::Unknown`] so the caller can ignore them.

use crate::client::{ChannelId, UserId};
use crate::error::RealtimeError;
use crate::event::EventKind;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

#[derive(Debug, Deserialize)]
struct ChannelRef {
    #[serde(default)]
    channel_id: ChannelId,
}

/// Which WebRTC negotiation message is being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Ice,
}

impl SignalKind {
    /// Tag used when the signal is forwarded.
    pub fn event_kind(self) -> EventKind {
        match self {
            Self::Offer => EventKind::VoiceOffer,
            Self::Answer => EventKind::VoiceAnswer,
            Self::Ice => EventKind::VoiceIce,
        }
    }
}

/// Payload of `voice.offer`, `voice.answer` and `voice.ice`.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalData {
    #[serde(default)]
    pub channel_id: ChannelId,
    #[serde(default)]
    pub target_user_id: UserId,
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}

/// Payload of `voice.media_state`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MediaStateCommand {
    #[serde(default)]
    pub channel_id: ChannelId,
    #[serde(default)]
    pub cam_enabled: bool,
    #[serde(default)]
    pub screen_sharing: bool,
}

/// An inbound command from a client.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Set the viewed channel. `None` clears it.
    Subscribe { channel_id: Option<ChannelId> },
    /// Typing indicator for a channel.
    Typing { channel_id: ChannelId },
    /// Join a voice room.
    VoiceJoin { channel_id: ChannelId },
    /// Leave a voice room.
    VoiceLeave { channel_id: ChannelId },
    /// Offer, answer or ICE candidate for one peer.
    Signal { kind: SignalKind, data: SignalData },
    /// Camera / screen-share state for the room.
    VoiceMediaState(MediaStateCommand),
    /// Keepalive.
    Ping,
    /// Any tag this server does not handle.
    Unknown(String),
}

impl ClientCommand {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, RealtimeError> {
        let frame: RawFrame =
            serde_json::from_str(text).map_err(|e| RealtimeError::Malformed(e.to_string()))?;
        let data = frame.data.as_deref();

        let command = match frame.kind.as_str() {
            "subscribe" => {
                let d: ChannelRef = payload(data)?;
                Self::Subscribe {
                    channel_id: Some(d.channel_id).filter(|c| !c.is_empty()),
                }
            }
            "typing" => Self::Typing {
                channel_id: channel_id(data)?,
            },
            "voice.join" => Self::VoiceJoin {
                channel_id: channel_id(data)?,
            },
            "voice.leave" => Self::VoiceLeave {
                channel_id: channel_id(data)?,
            },
            "voice.offer" => signal(SignalKind::Offer, data)?,
            "voice.answer" => signal(SignalKind::Answer, data)?,
            "voice.ice" => signal(SignalKind::Ice, data)?,
            "voice.media_state" => {
                let d: MediaStateCommand = payload(data)?;
                require(&d.channel_id, "channel_id")?;
                Self::VoiceMediaState(d)
            }
            "ping" => Self::Ping,
            _ => Self::Unknown(frame.kind.clone()),
        };
        Ok(command)
    }

    /// Wire tag of the command.
    pub fn name(&self) -> &str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Typing { .. } => "typing",
            Self::VoiceJoin { .. } => "voice.join",
            Self::VoiceLeave { .. } => "voice.leave",
            Self::Signal { kind, .. } => kind.event_kind().as_str(),
            Self::VoiceMediaState(_) => "voice.media_state",
            Self::Ping => "ping",
            Self::Unknown(tag) => tag,
        }
    }
}

fn payload<T: DeserializeOwned>(data: Option<&RawValue>) -> Result<T, RealtimeError> {
    let raw = data.ok_or(RealtimeError::MissingField("data"))?;
    serde_json::from_str(raw.get()).map_err(|e| RealtimeError::Malformed(e.to_string()))
}

fn require(value: &str, field: &'static str) -> Result<(), RealtimeError> {
    if value.is_empty() {
        return Err(RealtimeError::MissingField(field));
    }
    Ok(())
}

fn channel_id(data: Option<&RawValue>) -> Result<ChannelId, RealtimeError> {
    let d: ChannelRef = payload(data)?;
    require(&d.channel_id, "channel_id")?;
    Ok(d.channel_id)
}

fn signal(kind: SignalKind, data: Option<&RawValue>) -> Result<ClientCommand, RealtimeError> {
    let d: SignalData = payload(data)?;
    require(&d.channel_id, "channel_id")?;
    require(&d.target_user_id, "target_user_id")?;
    Ok(ClientCommand::Signal { kind, data: d })
}
