//! Observable room store state.

use parley_cache::{MessageId, RoomCacheStore, RoomId, UserId};
use parley_core::Environment;

/// Cached detail of one room, reduced to identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    /// Room ID.
    pub id: RoomId,
    /// Message IDs in display order.
    pub message_ids: Vec<MessageId>,
    /// Member user IDs.
    pub member_ids: Vec<UserId>,
}

/// Everything the invariants look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Configured capacity.
    pub max_cached_rooms: usize,
    /// Cached rooms, sorted by ID.
    pub rooms: Vec<RoomSnapshot>,
    /// Listing IDs in listing order.
    pub listed: Vec<RoomId>,
}

impl StoreSnapshot {
    /// Snapshot with nothing cached or listed.
    pub fn empty(max_cached_rooms: usize) -> Self {
        Self { max_cached_rooms, rooms: Vec::new(), listed: Vec::new() }
    }

    /// Extract a snapshot from `store`.
    pub fn from_store<E: Environment>(store: &RoomCacheStore<E>) -> Self {
        let mut ids = store.cached_room_ids();
        ids.sort_unstable();

        let rooms = ids
            .into_iter()
            .filter_map(|id| {
                let entry = store.get_cached_room(id)?;
                Some(RoomSnapshot {
                    id,
                    message_ids: entry.messages.iter().map(|m| m.id.clone()).collect(),
                    member_ids: entry.members.iter().map(|m| m.user_id).collect(),
                })
            })
            .collect();

        Self {
            max_cached_rooms: store.config().max_cached_rooms,
            rooms,
            listed: store.room_list().iter().map(|r| r.id).collect(),
        }
    }
}
