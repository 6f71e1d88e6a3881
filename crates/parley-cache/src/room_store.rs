//! Bounded per-room cache and room listing.
//!
//! Holds full detail (metadata, message sequence, member set) for at most
//! `max_cached_rooms` rooms, keyed by room ID, plus the top-level listing of
//! room summaries. The listing is independent of the detail cache: a room can
//! be listed without being cached.
//!
//! # Eviction
//!
//! Inserting a room that is not yet cached while the cache is full first
//! evicts the room with the oldest `last_fetch`. Rooms fetched at the same
//! instant are evicted in insertion order. Updating a room that is already
//! cached never evicts.
//!
//! # Message de-duplication
//!
//! A message ID appears at most once per room. An optimistic local message and
//! its server-confirmed counterpart are reconciled so that, whichever arrives
//! first, the room ends up holding exactly one copy under the server ID.

use std::{collections::HashMap, time::Duration};

use parley_core::Environment;

use crate::{
    error::CacheError,
    model::{
        Member, Message, MessageId, MessagePatch, RoomId, RoomMetadata, RoomPatch, RoomSummary,
        RoomSummaryPatch,
    },
};

/// Rooms kept in the detail cache before eviction starts.
pub const DEFAULT_MAX_CACHED_ROOMS: usize = 5;

/// Age after which cached room detail is considered stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Room store configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStoreConfig {
    /// Capacity of the detail cache
    pub max_cached_rooms: usize,
    /// Default `max_age` for [`RoomCacheStore::is_cache_stale`]
    pub stale_after: Duration,
}

impl Default for RoomStoreConfig {
    fn default() -> Self {
        Self { max_cached_rooms: DEFAULT_MAX_CACHED_ROOMS, stale_after: DEFAULT_STALE_AFTER }
    }
}

/// Observable mutation of the store, reported to the change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    /// Room detail inserted or merged.
    RoomCached(RoomId),
    /// Room detail evicted to respect capacity.
    RoomEvicted(RoomId),
    /// Room removed from listing and cache.
    RoomDropped(RoomId),
    /// A room's message sequence changed.
    MessagesChanged(RoomId),
    /// A room's member set changed.
    MembersChanged(RoomId),
    /// The room listing changed.
    RoomListChanged,
}

type ChangeListener = Box<dyn FnMut(StoreChange) + Send>;

/// Cached detail for one room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomCacheEntry<I> {
    /// Room metadata, once fetched.
    pub room: Option<RoomMetadata>,
    /// Messages in display order.
    pub messages: Vec<Message>,
    /// Members, unique by user ID.
    pub members: Vec<Member>,
    /// When this entry was last written by a fetch.
    pub last_fetch: Option<I>,
    inserted: u64,
}

impl<I> RoomCacheEntry<I> {
    /// Message with the given ID.
    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }
}

/// Bounded room detail cache plus the room listing.
pub struct RoomCacheStore<E: Environment> {
    env: E,
    config: RoomStoreConfig,
    rooms: HashMap<RoomId, RoomCacheEntry<E::Instant>>,
    room_list: Vec<RoomSummary>,
    next_insert: u64,
    listener: Option<ChangeListener>,
}

impl<E: Environment> std::fmt::Debug for RoomCacheStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomCacheStore")
            .field("config", &self.config)
            .field("cached", &self.rooms.len())
            .field("listed", &self.room_list.len())
            .finish_non_exhaustive()
    }
}

impl<E: Environment> RoomCacheStore<E> {
    /// Create an empty store.
    ///
    /// # Errors
    ///
    /// - `CacheError::InvalidCapacity` if `max_cached_rooms` is zero
    pub fn new(env: E, config: RoomStoreConfig) -> Result<Self, CacheError> {
        if config.max_cached_rooms == 0 {
            return Err(CacheError::InvalidCapacity(0));
        }
        Ok(Self {
            env,
            config,
            rooms: HashMap::new(),
            room_list: Vec::new(),
            next_insert: 0,
            listener: None,
        })
    }

    /// Install the change listener, replacing any previous one.
    pub fn set_listener<F>(&mut self, listener: F)
    where
        F: FnMut(StoreChange) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    /// Store configuration.
    pub fn config(&self) -> &RoomStoreConfig {
        &self.config
    }

    /// Number of rooms with cached detail.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no room detail is cached.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// IDs of rooms with cached detail, in no particular order.
    pub fn cached_room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().copied().collect()
    }

    /// Cached detail for `room_id`, with no staleness check.
    pub fn get_cached_room(&self, room_id: RoomId) -> Option<&RoomCacheEntry<E::Instant>> {
        self.rooms.get(&room_id)
    }

    /// Whether `room_id` has cached detail.
    pub fn is_cached(&self, room_id: RoomId) -> bool {
        self.rooms.contains_key(&room_id)
    }

    /// True if `room_id` is not cached, was never fetched, or was fetched more
    /// than `max_age` ago.
    pub fn is_cache_stale(&self, room_id: RoomId, max_age: Duration) -> bool {
        let Some(last_fetch) = self.rooms.get(&room_id).and_then(|e| e.last_fetch) else {
            return true;
        };
        self.env.now() - last_fetch > max_age
    }

    /// [`RoomCacheStore::is_cache_stale`] with the configured default age.
    pub fn is_stale(&self, room_id: RoomId) -> bool {
        self.is_cache_stale(room_id, self.config.stale_after)
    }

    /// Merge `patch` into the room's entry and stamp it as freshly fetched.
    ///
    /// Inserting a new room into a full cache evicts the oldest-fetched room
    /// first. Updating a cached room never evicts.
    pub fn set_cached_room(&mut self, room_id: RoomId, patch: RoomPatch) {
        let now = self.env.now();

        if !self.rooms.contains_key(&room_id) {
            if self.rooms.len() >= self.config.max_cached_rooms {
                self.evict_oldest();
            }
            let inserted = self.next_insert;
            self.next_insert += 1;
            self.rooms.insert(room_id, RoomCacheEntry {
                room: None,
                messages: Vec::new(),
                members: Vec::new(),
                last_fetch: None,
                inserted,
            });
        }

        let members_changed = patch.members.is_some();
        let messages_changed = patch.messages.is_some();
        if let Some(entry) = self.rooms.get_mut(&room_id) {
            if let Some(room) = patch.room {
                entry.room = Some(room);
            }
            if let Some(messages) = patch.messages {
                entry.messages = dedupe_messages(messages);
            }
            if let Some(members) = patch.members {
                entry.members = dedupe_members(members);
            }
            entry.last_fetch = Some(now);
        }

        self.notify(StoreChange::RoomCached(room_id));
        if messages_changed {
            self.notify(StoreChange::MessagesChanged(room_id));
        }
        if members_changed {
            self.notify(StoreChange::MembersChanged(room_id));
        }
    }

    /// Append `message` to a cached room unless a message with the same ID is
    /// already there. Returns whether it was appended.
    pub fn add_message(&mut self, room_id: RoomId, message: Message) -> bool {
        let Some(entry) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        if entry.position(&message.id).is_some() {
            tracing::trace!(room_id, id = %message.id, "duplicate message ignored");
            return false;
        }

        entry.messages.push(message);
        self.notify(StoreChange::MessagesChanged(room_id));
        true
    }

    /// Remove the message with `message_id`. Returns whether one was removed.
    pub fn remove_message(&mut self, room_id: RoomId, message_id: &MessageId) -> bool {
        let Some(entry) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        let before = entry.messages.len();
        entry.messages.retain(|m| &m.id != message_id);
        if entry.messages.len() == before {
            return false;
        }

        self.notify(StoreChange::MessagesChanged(room_id));
        true
    }

    /// Merge `patch` into the message with `message_id`. Returns whether the
    /// message was found.
    ///
    /// A patch that would re-ID the message onto an ID already present is
    /// applied without the ID change.
    pub fn update_message(
        &mut self,
        room_id: RoomId,
        message_id: &MessageId,
        mut patch: MessagePatch,
    ) -> bool {
        let Some(entry) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        let Some(index) = entry.position(message_id) else {
            return false;
        };

        let id_taken = patch
            .id
            .as_ref()
            .is_some_and(|new_id| new_id != message_id && entry.position(new_id).is_some());
        if id_taken {
            patch.id = None;
        }
        patch.apply(&mut entry.messages[index]);

        self.notify(StoreChange::MessagesChanged(room_id));
        true
    }

    /// Replace the optimistic message `local_id` with its persisted form.
    ///
    /// If the persisted ID is already present (the server echo arrived first)
    /// the local copy is removed instead. If the local copy is gone the
    /// persisted message is appended. Returns whether the room is cached.
    pub fn reconcile_message(
        &mut self,
        room_id: RoomId,
        local_id: &MessageId,
        persisted: Message,
    ) -> bool {
        let Some(entry) = self.rooms.get_mut(&room_id) else {
            return false;
        };

        let local = entry.position(local_id);
        let existing = entry.position(&persisted.id);
        match (local, existing) {
            (Some(index), None) => entry.messages[index] = persisted,
            (Some(index), Some(_)) => {
                entry.messages.remove(index);
            },
            (None, None) => entry.messages.push(persisted),
            (None, Some(_)) => return true,
        }

        self.notify(StoreChange::MessagesChanged(room_id));
        true
    }

    /// Fold a server-echoed copy of one of our own messages into the pending
    /// local message it confirms.
    ///
    /// Replaces the oldest local message with the same content in place.
    /// Returns `false` if there is no such pending message, in which case the
    /// caller should fall back to [`RoomCacheStore::add_message`].
    pub fn absorb_echo(&mut self, room_id: RoomId, message: Message) -> bool {
        let Some(entry) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        if entry.position(&message.id).is_some() {
            // Already confirmed, nothing pending to absorb
            return false;
        }
        let Some(index) =
            entry.messages.iter().position(|m| m.id.is_local() && m.same_content(&message))
        else {
            return false;
        };

        entry.messages[index] = message;
        self.notify(StoreChange::MessagesChanged(room_id));
        true
    }

    /// Add `member` to a cached room unless present. Returns whether added.
    pub fn add_member(&mut self, room_id: RoomId, member: Member) -> bool {
        let Some(entry) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        if entry.members.iter().any(|m| m.user_id == member.user_id) {
            return false;
        }
        entry.members.push(member);
        self.notify(StoreChange::MembersChanged(room_id));
        true
    }

    /// Top-level room listing.
    pub fn room_list(&self) -> &[RoomSummary] {
        &self.room_list
    }

    /// Summary for `room_id` from the listing.
    pub fn room_summary(&self, room_id: RoomId) -> Option<&RoomSummary> {
        self.room_list.iter().find(|r| r.id == room_id)
    }

    /// Replace the listing, keeping the first summary for each ID.
    pub fn set_room_list(&mut self, rooms: Vec<RoomSummary>) {
        let mut list: Vec<RoomSummary> = Vec::with_capacity(rooms.len());
        for room in rooms {
            if !list.iter().any(|r| r.id == room.id) {
                list.push(room);
            }
        }
        self.room_list = list;
        self.notify(StoreChange::RoomListChanged);
    }

    /// Append `summary` to the listing unless its ID is already listed.
    pub fn add_room_to_list(&mut self, summary: RoomSummary) -> bool {
        if self.room_list.iter().any(|r| r.id == summary.id) {
            return false;
        }
        self.room_list.push(summary);
        self.notify(StoreChange::RoomListChanged);
        true
    }

    /// Merge `patch` into the listing entry for `room_id`, whether or not its
    /// detail is cached. Returns whether the room is listed.
    pub fn update_room_in_list(&mut self, room_id: RoomId, patch: RoomSummaryPatch) -> bool {
        let Some(summary) = self.room_list.iter_mut().find(|r| r.id == room_id) else {
            return false;
        };
        patch.apply(summary);
        self.notify(StoreChange::RoomListChanged);
        true
    }

    /// Remove `room_id` from both the listing and the detail cache. Returns
    /// whether it was present in either.
    pub fn remove_room(&mut self, room_id: RoomId) -> bool {
        let listed_before = self.room_list.len();
        self.room_list.retain(|r| r.id != room_id);
        let was_listed = self.room_list.len() != listed_before;
        let was_cached = self.rooms.remove(&room_id).is_some();

        if was_listed || was_cached {
            self.notify(StoreChange::RoomDropped(room_id));
        }
        if was_listed {
            self.notify(StoreChange::RoomListChanged);
        }
        was_listed || was_cached
    }

    /// Drop cached detail for `room_id`, keeping its listing entry.
    pub fn invalidate_room(&mut self, room_id: RoomId) -> bool {
        let removed = self.rooms.remove(&room_id).is_some();
        if removed {
            self.notify(StoreChange::RoomDropped(room_id));
        }
        removed
    }

    /// Drop all cached detail and the listing.
    pub fn clear(&mut self) {
        self.rooms.clear();
        self.room_list.clear();
        self.notify(StoreChange::RoomListChanged);
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .rooms
            .iter()
            .min_by_key(|(_, entry)| (entry.last_fetch, entry.inserted))
            .map(|(room_id, _)| *room_id);

        if let Some(room_id) = oldest {
            self.rooms.remove(&room_id);
            tracing::debug!(room_id, "room evicted from cache");
            self.notify(StoreChange::RoomEvicted(room_id));
        }
    }

    fn notify(&mut self, change: StoreChange) {
        if let Some(listener) = self.listener.as_mut() {
            listener(change);
        }
    }
}

fn dedupe_messages(messages: Vec<Message>) -> Vec<Message> {
    let mut unique: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        if !unique.iter().any(|m| m.id == message.id) {
            unique.push(message);
        }
    }
    unique
}

fn dedupe_members(members: Vec<Member>) -> Vec<Member> {
    let mut unique: Vec<Member> = Vec::with_capacity(members.len());
    for member in members {
        if !unique.iter().any(|m| m.user_id == member.user_id) {
            unique.push(member);
        }
    }
    unique
}
