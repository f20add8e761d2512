//! WebRTC signaling relay.
//!
//! Offers, answers and ICE candidates are forwarded only between users who
//! are both in the voice room named by the message. Anything else is dropped
//! without a reply, so a non-member learns nothing about who is in a call.
//! Payloads are passed through untouched.

use crate::client::Client;
use crate::command::{SignalData, SignalKind};
use crate::event::{SignalRelayData, WsEvent};
use crate::hub::EventHub;
use std::sync::Arc;
use tracing::debug;

/// What happened to a relayed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Forwarded to this many of the target's connections.
    Forwarded(usize),
    /// Sender and target are not co-members.
    Dropped,
}

impl EventHub {
    /// Relay a signaling message from `sender` to `data.target_user_id`.
    ///
    /// Co-membership is checked at call time and not held across the send.
    /// A target that leaves in between may still get the message.
    pub fn relay_signal(
        &self,
        sender: &Arc<Client>,
        kind: SignalKind,
        data: SignalData,
    ) -> RelayOutcome {
        let SignalData {
            channel_id,
            target_user_id,
            payload,
        } = data;

        if target_user_id == sender.user_id
            || !self
                .rooms()
                .are_co_members(&channel_id, &sender.user_id, &target_user_id)
        {
            debug!(
                client_id = %sender.id,
                channel_id = %channel_id,
                signal = %kind.event_kind(),
                "Dropping signal between non-members"
            );
            self.record_signal(false);
            return RelayOutcome::Dropped;
        }

        let event = WsEvent::new(
            kind.event_kind(),
            SignalRelayData {
                channel_id,
                from_user_id: sender.user_id.clone(),
                payload,
            },
        );
        let delivered = self.send_to_user(&target_user_id, &event);
        self.record_signal(true);
        RelayOutcome::Forwarded(delivered)
    }
}
