//! Publishing API for the REST and storage layers.
//!
//! Full message payloads go only to viewers of the channel. Everyone else
//! gets a small `message.activity` digest so unread badges stay current.

use crate::error::RealtimeError;
use crate::event::{EventKind, MessageActivity, MessageDeleteData, WsEvent};
use crate::hub::EventHub;
use serde::Serialize;

/// Maximum number of characters in a `message.activity` preview.
pub const PREVIEW_CHARS: usize = 120;

/// Shorten message content for the activity digest.
pub fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &content[..cut]),
        None => content.to_string(),
    }
}

impl EventHub {
    /// Publish a newly stored message.
    ///
    /// `message` is sent as `message.new` to viewers of
    /// `activity.channel_id`; `activity` is then broadcast to everyone.
    pub fn publish_message_new<T: Serialize>(&self, message: &T, activity: &MessageActivity) {
        self.broadcast_to_channel(
            &activity.channel_id,
            &WsEvent::new(EventKind::MessageNew, message),
        );
        self.broadcast_global(&WsEvent::new(EventKind::MessageActivity, activity));
    }

    /// Publish an edited message to the channel's viewers.
    pub fn publish_message_edit<T: Serialize>(&self, channel_id: &str, message: &T) -> usize {
        self.broadcast_to_channel(channel_id, &WsEvent::new(EventKind::MessageEdit, message))
    }

    /// Publish a deletion to the channel's viewers.
    pub fn publish_message_delete(&self, channel_id: &str, message_id: &str) -> usize {
        let data = MessageDeleteData {
            id: message_id.to_string(),
            channel_id: channel_id.to_string(),
        };
        self.broadcast_to_channel(channel_id, &WsEvent::new(EventKind::MessageDelete, data))
    }

    /// Publish the full, recomputed reaction list of a message.
    pub fn publish_reaction_update<T: Serialize>(&self, channel_id: &str, reactions: &T) -> usize {
        self.broadcast_to_channel(
            channel_id,
            &WsEvent::new(EventKind::ReactionUpdate, reactions),
        )
    }

    /// Publish a channel, category, emoji or member roster change to everyone.
    pub fn publish_server_event<T: Serialize>(
        &self,
        kind: EventKind,
        data: &T,
    ) -> Result<usize, RealtimeError> {
        if !kind.is_server_wide() {
            return Err(RealtimeError::NotPublishable(kind.as_str()));
        }
        Ok(self.broadcast_global(&WsEvent::new(kind, data)))
    }
}
