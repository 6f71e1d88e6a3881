//! Maps inbound real-time events onto cache mutations.
//!
//! Events are matched by their `type` discriminator. Known kinds are decoded
//! into [`RoomEvent`] and applied to the [`RoomCacheStore`]; a mutation that
//! targets a room or message which is not cached is a no-op. Unknown kinds are
//! ignored.

use std::collections::HashSet;

use parley_cache::{
    Message, MessageId, MessagePatch, Reaction, RoomCacheStore, RoomId, RoomSummary,
    RoomSummaryPatch, SessionId, UserId,
};
use parley_core::{Environment, ServerEvent, protocol::kind};
use serde::Deserialize;

/// Typed form of the event kinds the router understands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A message was posted to a room or a direct-message session.
    NewMessage {
        /// Target room, for room messages
        #[serde(default)]
        room_id: Option<RoomId>,
        /// Target session, for direct messages
        #[serde(default)]
        session_id: Option<SessionId>,
        /// The persisted message
        message: Message,
    },
    /// A user joined a room.
    UserJoinedRoom {
        /// Room joined
        room_id: RoomId,
        /// Who joined
        user_id: UserId,
    },
    /// A user left a room.
    UserLeftRoom {
        /// Room left
        room_id: RoomId,
        /// Who left
        user_id: UserId,
    },
    /// A reaction was added to a message.
    MessageReacted {
        /// Room holding the message
        room_id: RoomId,
        /// Message reacted to
        message_id: MessageId,
        /// The new reaction
        reaction: Reaction,
    },
    /// A reaction was removed from a message.
    ReactionRemoved {
        /// Room holding the message
        room_id: RoomId,
        /// Message the reaction was on
        message_id: MessageId,
        /// Who had reacted
        user_id: UserId,
        /// Emoji removed
        emoji: String,
    },
    /// A room became visible to the current user.
    RoomCreated {
        /// Listing entry for the new room
        room: RoomSummary,
    },
    /// A room was deleted.
    RoomDeleted {
        /// Deleted room
        room_id: RoomId,
    },
    /// A message was read by its recipient.
    MessageRead {
        /// Room holding the message
        room_id: RoomId,
        /// Message read
        message_id: MessageId,
    },
    /// A user came online.
    UserOnline {
        /// Who
        user_id: UserId,
    },
    /// A user went offline.
    UserOffline {
        /// Who
        user_id: UserId,
    },
}

/// What routing an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The caches were updated.
    Applied,
    /// Nothing to update: the target is not cached or the event was already
    /// applied.
    NoOp,
    /// Membership of a cached room changed; its member set should be
    /// re-fetched.
    RefetchMembers(RoomId),
    /// A direct message arrived. Session caches are owned by the caller.
    SessionMessage {
        /// Session the message belongs to
        session_id: SessionId,
        /// The persisted message
        message: Message,
    },
    /// Event kind not handled by the router.
    Unrecognized,
    /// Known kind whose payload could not be decoded.
    Malformed,
}

/// Routes inbound events into a [`RoomCacheStore`].
#[derive(Debug, Clone, Default)]
pub struct EventRouter {
    current_user: Option<UserId>,
    active_room: Option<RoomId>,
    online: HashSet<UserId>,
}

impl EventRouter {
    /// Router for the logged-in user.
    pub fn new(current_user: UserId) -> Self {
        Self { current_user: Some(current_user), ..Self::default() }
    }

    /// Logged-in user, if known.
    pub fn current_user(&self) -> Option<UserId> {
        self.current_user
    }

    /// Change the logged-in user.
    pub fn set_current_user(&mut self, user: Option<UserId>) {
        self.current_user = user;
    }

    /// Room currently on screen. Its new messages do not count as unread.
    pub fn active_room(&self) -> Option<RoomId> {
        self.active_room
    }

    /// Set or clear the room on screen.
    pub fn set_active_room(&mut self, room_id: Option<RoomId>) {
        self.active_room = room_id;
    }

    /// Whether `user_id` was last reported online.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online.contains(&user_id)
    }

    /// Users currently reported online.
    pub fn online_users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.online.iter().copied()
    }

    /// Decode `event` and apply it to `store`.
    pub fn route<E: Environment>(
        &mut self,
        event: &ServerEvent,
        store: &mut RoomCacheStore<E>,
    ) -> RouteOutcome {
        match Self::decode(event) {
            Ok(Some(typed)) => self.apply(typed, store),
            Ok(None) => {
                tracing::trace!(kind = event.kind(), "unrecognized event ignored");
                RouteOutcome::Unrecognized
            },
            Err(e) => {
                tracing::warn!(kind = event.kind(), error = %e, "malformed event payload");
                RouteOutcome::Malformed
            },
        }
    }

    /// Typed form of `event`, or `None` if its kind is not handled.
    ///
    /// # Errors
    ///
    /// Returns the decode error if the kind is handled but the payload does
    /// not match its shape.
    pub fn decode(event: &ServerEvent) -> Result<Option<RoomEvent>, serde_json::Error> {
        match event.kind() {
            kind::NEW_MESSAGE
            | kind::USER_JOINED_ROOM
            | kind::USER_LEFT_ROOM
            | kind::MESSAGE_REACTED
            | kind::REACTION_REMOVED
            | kind::ROOM_CREATED
            | kind::ROOM_DELETED
            | kind::MESSAGE_READ
            | kind::USER_ONLINE
            | kind::USER_OFFLINE => RoomEvent::deserialize(event.body()).map(Some),
            _ => Ok(None),
        }
    }

    /// Apply an already decoded event to `store`.
    pub fn apply<E: Environment>(
        &mut self,
        event: RoomEvent,
        store: &mut RoomCacheStore<E>,
    ) -> RouteOutcome {
        match event {
            RoomEvent::NewMessage { room_id: Some(room_id), message, .. } => {
                self.apply_new_message(room_id, message, store)
            },
            RoomEvent::NewMessage { room_id: None, session_id: Some(session_id), mut message } => {
                message.is_own = self.is_own(&message);
                RouteOutcome::SessionMessage { session_id, message }
            },
            RoomEvent::NewMessage { room_id: None, session_id: None, .. } => {
                tracing::warn!("new_message without room or session");
                RouteOutcome::Malformed
            },
            RoomEvent::UserJoinedRoom { room_id, user_id }
            | RoomEvent::UserLeftRoom { room_id, user_id } => {
                if !store.is_cached(room_id) {
                    return RouteOutcome::NoOp;
                }
                tracing::debug!(room_id, user_id, "room membership changed");
                RouteOutcome::RefetchMembers(room_id)
            },
            RoomEvent::MessageReacted { room_id, message_id, reaction } => {
                let Some(message) =
                    store.get_cached_room(room_id).and_then(|entry| entry.message(&message_id))
                else {
                    return RouteOutcome::NoOp;
                };
                if message.reactions.contains(&reaction) {
                    return RouteOutcome::NoOp;
                }
                let mut reactions = message.reactions.clone();
                reactions.push(reaction);
                outcome(store.update_message(
                    room_id,
                    &message_id,
                    MessagePatch::reactions(reactions),
                ))
            },
            RoomEvent::ReactionRemoved { room_id, message_id, user_id, emoji } => {
                let Some(message) =
                    store.get_cached_room(room_id).and_then(|entry| entry.message(&message_id))
                else {
                    return RouteOutcome::NoOp;
                };
                let reactions: Vec<Reaction> = message
                    .reactions
                    .iter()
                    .filter(|r| !(r.user_id == user_id && r.emoji == emoji))
                    .cloned()
                    .collect();
                if reactions.len() == message.reactions.len() {
                    return RouteOutcome::NoOp;
                }
                outcome(store.update_message(
                    room_id,
                    &message_id,
                    MessagePatch::reactions(reactions),
                ))
            },
            RoomEvent::RoomCreated { room } => outcome(store.add_room_to_list(room)),
            RoomEvent::RoomDeleted { room_id } => {
                if self.active_room == Some(room_id) {
                    self.active_room = None;
                }
                outcome(store.remove_room(room_id))
            },
            RoomEvent::MessageRead { room_id, message_id } => {
                let already_read = store
                    .get_cached_room(room_id)
                    .and_then(|entry| entry.message(&message_id))
                    .is_some_and(|m| m.read);
                if already_read {
                    return RouteOutcome::NoOp;
                }
                outcome(store.update_message(room_id, &message_id, MessagePatch::read(true)))
            },
            RoomEvent::UserOnline { user_id } => outcome(self.online.insert(user_id)),
            RoomEvent::UserOffline { user_id } => outcome(self.online.remove(&user_id)),
        }
    }

    fn apply_new_message<E: Environment>(
        &self,
        room_id: RoomId,
        mut message: Message,
        store: &mut RoomCacheStore<E>,
    ) -> RouteOutcome {
        let already_seen = store
            .get_cached_room(room_id)
            .is_some_and(|entry| entry.message(&message.id).is_some());
        if already_seen {
            return RouteOutcome::NoOp;
        }

        let own = self.is_own(&message);
        message.is_own = own;
        let preview = message.preview();

        let cached = store.is_cached(room_id);
        if cached && !(own && store.absorb_echo(room_id, message.clone())) {
            store.add_message(room_id, message);
        }

        let mut patch = RoomSummaryPatch { last_message: Some(preview), ..Default::default() };
        if !own && self.active_room != Some(room_id) {
            let unread = store.room_summary(room_id).map_or(0, |s| s.unread_count);
            patch.unread_count = Some(unread.saturating_add(1));
        }
        let listed = store.update_room_in_list(room_id, patch);

        outcome(cached || listed)
    }

    fn is_own(&self, message: &Message) -> bool {
        self.current_user == Some(message.sender_id)
    }
}

fn outcome(changed: bool) -> RouteOutcome {
    if changed { RouteOutcome::Applied } else { RouteOutcome::NoOp }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(body: serde_json::Value) -> ServerEvent {
        let kind = body["type"].as_str().unwrap_or_default().to_string();
        ServerEvent::new(kind, body)
    }

    #[test]
    fn decodes_new_message() {
        let decoded = EventRouter::decode(&event(json!({
            "type": "new_message",
            "room_id": 3,
            "message": {"id": 10, "sender_id": 2, "content": "hi"}
        })));

        let Ok(Some(RoomEvent::NewMessage { room_id, session_id, message })) = decoded else {
            panic!("expected new_message, got {decoded:?}");
        };
        assert_eq!(room_id, Some(3));
        assert_eq!(session_id, None);
        assert_eq!(message.id, MessageId::Server(10));
    }

    #[test]
    fn unknown_kind_is_not_an_error() {
        let decoded = EventRouter::decode(&event(json!({"type": "typing", "room_id": 1})));
        assert!(matches!(decoded, Ok(None)));
    }

    #[test]
    fn known_kind_with_bad_payload_is_an_error() {
        let decoded = EventRouter::decode(&event(json!({"type": "room_deleted", "room_id": "x"})));
        assert!(decoded.is_err());
    }

    #[test]
    fn active_room_cleared_when_deleted() {
        let mut router = EventRouter::new(1);
        router.set_active_room(Some(4));

        let mut store = parley_cache::RoomCacheStore::new(
            crate::SystemEnv::new(),
            parley_cache::RoomStoreConfig::default(),
        )
        .expect("valid config");
        router.apply(RoomEvent::RoomDeleted { room_id: 4 }, &mut store);

        assert_eq!(router.active_room(), None);
    }

    #[test]
    fn presence_tracks_online_and_offline() {
        let mut router = EventRouter::new(1);
        let mut store = parley_cache::RoomCacheStore::new(
            crate::SystemEnv::new(),
            parley_cache::RoomStoreConfig::default(),
        )
        .expect("valid config");

        assert_eq!(
            router.apply(RoomEvent::UserOnline { user_id: 7 }, &mut store),
            RouteOutcome::Applied
        );
        assert!(router.is_online(7));
        assert_eq!(
            router.apply(RoomEvent::UserOnline { user_id: 7 }, &mut store),
            RouteOutcome::NoOp
        );
        router.apply(RoomEvent::UserOffline { user_id: 7 }, &mut store);
        assert!(!router.is_online(7));
    }
}
