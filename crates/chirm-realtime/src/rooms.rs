//! Voice room membership.

use crate::client::{ChannelId, Client, ClientId, UserId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

type Members = HashMap<ClientId, Arc<Client>>;

/// Tracks which connections are in which voice room.
///
/// Membership is stored per connection. Rooms that become empty are removed
/// in the same critical section that emptied them.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<ChannelId, Members>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `client` to the room and return the distinct users already there.
    ///
    /// The joining user is never listed, even if another of their
    /// connections is in the room. Returns `None` without joining once the
    /// client's queue is closed: cleanup closes the queue before its
    /// `leave_all`, so a closed client can never be left behind in a room.
    pub fn join(&self, channel_id: &str, client: &Arc<Client>) -> Option<Vec<UserId>> {
        let mut rooms = self.rooms.write();
        if client.is_queue_closed() {
            return None;
        }
        let members = rooms.entry(channel_id.to_string()).or_default();
        let existing: BTreeSet<&UserId> = members
            .values()
            .filter(|m| m.id != client.id && m.user_id != client.user_id)
            .map(|m| &m.user_id)
            .collect();
        let existing: Vec<UserId> = existing.into_iter().cloned().collect();
        members.insert(client.id.clone(), Arc::clone(client));
        Some(existing)
    }

    /// Remove a connection from one room. Returns whether it was present.
    pub fn leave(&self, channel_id: &str, client_id: &str) -> bool {
        let mut rooms = self.rooms.write();
        let Some(members) = rooms.get_mut(channel_id) else {
            return false;
        };
        let removed = members.remove(client_id).is_some();
        if members.is_empty() {
            rooms.remove(channel_id);
        }
        removed
    }

    /// Remove a connection from every room. Returns the affected rooms, sorted.
    pub fn leave_all(&self, client_id: &str) -> Vec<ChannelId> {
        let mut rooms = self.rooms.write();
        let mut affected = Vec::new();
        rooms.retain(|channel_id, members| {
            if members.remove(client_id).is_some() {
                affected.push(channel_id.clone());
            }
            !members.is_empty()
        });
        affected.sort();
        affected
    }

    /// True iff both users have at least one connection in the room.
    pub fn are_co_members(&self, channel_id: &str, user_a: &str, user_b: &str) -> bool {
        let rooms = self.rooms.read();
        let Some(members) = rooms.get(channel_id) else {
            return false;
        };
        let has = |user: &str| members.values().any(|m| m.user_id == user);
        has(user_a) && has(user_b)
    }

    /// Whether a specific connection is in the room.
    pub fn contains(&self, channel_id: &str, client_id: &str) -> bool {
        self.rooms
            .read()
            .get(channel_id)
            .is_some_and(|members| members.contains_key(client_id))
    }

    /// Connections currently in the room.
    pub fn members(&self, channel_id: &str) -> Vec<Arc<Client>> {
        self.rooms
            .read()
            .get(channel_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Point-in-time view of every active room and its distinct users.
    pub fn snapshot(&self) -> BTreeMap<ChannelId, Vec<UserId>> {
        self.rooms
            .read()
            .iter()
            .map(|(channel_id, members)| {
                let users: BTreeSet<&UserId> = members.values().map(|m| &m.user_id).collect();
                (channel_id.clone(), users.into_iter().cloned().collect())
            })
            .collect()
    }

    /// Number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}
