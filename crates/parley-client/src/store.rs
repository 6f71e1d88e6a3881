//! Read-through/write-through facade over the client caches.
//!
//! Reads consult the caches first and fall back to the REST collaborator;
//! writes update the caches optimistically before the REST call and reconcile
//! or roll back once it completes.
//!
//! A send is split into [`ChatStore::begin_room_send`] /
//! [`ChatStore::begin_session_send`] and [`ChatStore::finish_send`] so the
//! caller can keep applying real-time events while the REST call is in
//! flight. The server echo of the message may then arrive before or after
//! the REST response; either way the cache ends up with exactly one copy.

use std::sync::Arc;

use parley_cache::{
    EntityCache, Message, MessageDraft, MessageId, RoomCacheEntry, RoomCacheStore, RoomId,
    RoomPatch, RoomSummary, RoomSummaryPatch, Session, SessionId, UserId,
};
use parley_core::{Environment, ServerEvent};
use regex::Regex;

use crate::{
    api::{ApiError, ChatApi},
    config::ClientConfig,
    error::ClientError,
    router::{EventRouter, RouteOutcome},
};

const SESSIONS_KEY: &str = "sessions";

fn messages_key(session_id: SessionId) -> String {
    format!("messages_{session_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendTarget {
    Room(RoomId),
    Session(SessionId),
}

/// An optimistic message awaiting its REST confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending send must be completed with ChatStore::finish_send"]
pub struct PendingSend {
    target: SendTarget,
    local_id: MessageId,
    draft: MessageDraft,
}

impl PendingSend {
    /// ID of the optimistic message.
    pub fn local_id(&self) -> &MessageId {
        &self.local_id
    }

    /// What is being sent.
    pub fn draft(&self) -> &MessageDraft {
        &self.draft
    }
}

/// Client-side data layer for rooms and direct-message sessions.
pub struct ChatStore<E: Environment, A: ChatApi> {
    env: E,
    api: Arc<A>,
    current_user: UserId,
    router: EventRouter,
    rooms: RoomCacheStore<E>,
    sessions: EntityCache<String, Vec<Session>, E>,
    messages: EntityCache<String, Vec<Message>, E>,
}

impl<E: Environment, A: ChatApi> std::fmt::Debug for ChatStore<E, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStore")
            .field("current_user", &self.current_user)
            .field("rooms", &self.rooms)
            .finish_non_exhaustive()
    }
}

impl<E: Environment, A: ChatApi> ChatStore<E, A> {
    /// Create a store for `current_user`.
    ///
    /// # Errors
    ///
    /// - `ClientError::Cache` if the configured capacity or a TTL is zero
    pub fn new(
        env: E,
        api: Arc<A>,
        current_user: UserId,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            rooms: RoomCacheStore::new(env.clone(), config.rooms.clone())?,
            sessions: EntityCache::new(env.clone(), config.session_ttl)?,
            messages: EntityCache::new(env.clone(), config.message_ttl)?,
            router: EventRouter::new(current_user),
            current_user,
            api,
            env,
        })
    }

    /// Logged-in user.
    pub fn current_user(&self) -> UserId {
        self.current_user
    }

    /// Shared handle to the REST collaborator.
    pub fn api(&self) -> Arc<A> {
        Arc::clone(&self.api)
    }

    /// Room cache and listing.
    pub fn room_cache(&self) -> &RoomCacheStore<E> {
        &self.rooms
    }

    /// Mutable room cache, e.g. to install a change listener.
    pub fn room_cache_mut(&mut self) -> &mut RoomCacheStore<E> {
        &mut self.rooms
    }

    /// Event router state (active room, presence).
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Set or clear the room on screen.
    pub fn set_active_room(&mut self, room_id: Option<RoomId>) {
        self.router.set_active_room(room_id);
    }

    /// Fetch the room listing and replace the cached one.
    pub async fn rooms(&mut self) -> Result<&[RoomSummary], ClientError> {
        let rooms = self.api.get_rooms().await?;
        self.rooms.set_room_list(rooms);
        Ok(self.rooms.room_list())
    }

    /// Room detail, fetched only if not cached or stale.
    ///
    /// Room, messages and members are fetched concurrently. Optimistic
    /// messages still pending in the old entry are carried over.
    pub async fn room(
        &mut self,
        room_id: RoomId,
    ) -> Result<&RoomCacheEntry<E::Instant>, ClientError> {
        if self.rooms.is_stale(room_id) {
            let api = Arc::clone(&self.api);
            let (room, mut messages, members) = futures::try_join!(
                api.get_room(room_id),
                api.get_room_messages(room_id),
                api.get_members(room_id)
            )?;

            for message in &mut messages {
                message.is_own = message.sender_id == self.current_user;
            }
            if let Some(entry) = self.rooms.get_cached_room(room_id) {
                messages.extend(entry.messages.iter().filter(|m| m.id.is_local()).cloned());
            }

            tracing::debug!(room_id, messages = messages.len(), "room fetched");
            self.rooms.set_cached_room(
                room_id,
                RoomPatch::default().with_room(room).with_messages(messages).with_members(members),
            );
        }

        self.rooms.get_cached_room(room_id).ok_or(ClientError::RoomUnavailable(room_id))
    }

    /// Re-fetch the member set of a cached room. Returns `false` if the room
    /// is not cached.
    pub async fn refresh_members(&mut self, room_id: RoomId) -> Result<bool, ClientError> {
        if !self.rooms.is_cached(room_id) {
            return Ok(false);
        }
        let members = self.api.get_members(room_id).await?;
        self.rooms.set_cached_room(room_id, RoomPatch::default().with_members(members));
        Ok(true)
    }

    /// Direct-message sessions, from cache while fresh.
    pub async fn sessions(&mut self) -> Result<Vec<Session>, ClientError> {
        if let Some(cached) = self.sessions.get(SESSIONS_KEY) {
            return Ok(cached.clone());
        }

        let sessions = self.api.get_sessions().await?;
        self.sessions.set(SESSIONS_KEY.to_string(), sessions.clone());
        Ok(sessions)
    }

    /// Messages of a session, from cache while fresh.
    pub async fn session_messages(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<Message>, ClientError> {
        let key = messages_key(session_id);
        if let Some(cached) = self.messages.get(&key) {
            return Ok(cached.clone());
        }

        let mut messages = self.api.get_messages(session_id).await?;
        for message in &mut messages {
            message.is_own = message.sender_id == self.current_user;
        }
        self.messages.set(key, messages.clone());
        Ok(messages)
    }

    /// Insert an optimistic message into a cached room.
    ///
    /// If the room is not cached nothing is inserted, and confirmation will
    /// only update the listing preview.
    pub fn begin_room_send(&mut self, room_id: RoomId, draft: MessageDraft) -> PendingSend {
        let local_id = MessageId::local(self.env.random_u64());
        let message = draft.clone().into_local_message(local_id.clone(), self.current_user);
        self.rooms.add_message(room_id, message);

        PendingSend { target: SendTarget::Room(room_id), local_id, draft }
    }

    /// Insert an optimistic message into a cached session history.
    pub fn begin_session_send(&mut self, session_id: SessionId, draft: MessageDraft) -> PendingSend {
        let local_id = MessageId::local(self.env.random_u64());
        let message = draft.clone().into_local_message(local_id.clone(), self.current_user);
        if let Some(messages) = self.messages.get_mut(&messages_key(session_id)) {
            messages.push(message);
        }

        PendingSend { target: SendTarget::Session(session_id), local_id, draft }
    }

    /// Complete a send with the REST outcome.
    ///
    /// On success the optimistic message is replaced by the persisted one
    /// (or dropped if the server echo already delivered it). On failure it
    /// is removed and the error returned.
    pub fn finish_send(
        &mut self,
        pending: PendingSend,
        result: Result<Message, ApiError>,
    ) -> Result<Message, ClientError> {
        let PendingSend { target, local_id, .. } = pending;

        match result {
            Ok(mut persisted) => {
                persisted.is_own = true;
                match target {
                    SendTarget::Room(room_id) => {
                        self.rooms.reconcile_message(room_id, &local_id, persisted.clone());
                        self.rooms.update_room_in_list(room_id, RoomSummaryPatch {
                            last_message: Some(persisted.preview()),
                            ..RoomSummaryPatch::default()
                        });
                    },
                    SendTarget::Session(session_id) => {
                        if let Some(messages) = self.messages.get_mut(&messages_key(session_id)) {
                            reconcile_in(messages, &local_id, persisted.clone());
                        }
                        self.touch_session(session_id, &persisted);
                    },
                }
                tracing::debug!(%local_id, id = %persisted.id, "send confirmed");
                Ok(persisted)
            },
            Err(e) => {
                match target {
                    SendTarget::Room(room_id) => {
                        self.rooms.remove_message(room_id, &local_id);
                    },
                    SendTarget::Session(session_id) => {
                        if let Some(messages) = self.messages.get_mut(&messages_key(session_id)) {
                            messages.retain(|m| m.id != local_id);
                        }
                    },
                }
                tracing::warn!(%local_id, error = %e, "send failed, optimistic message removed");
                Err(e.into())
            },
        }
    }

    /// Optimistically post to a room and wait for confirmation.
    pub async fn send_room_message(
        &mut self,
        room_id: RoomId,
        draft: MessageDraft,
    ) -> Result<Message, ClientError> {
        let pending = self.begin_room_send(room_id, draft);
        let result = self.api.send_room_message(room_id, pending.draft()).await;
        self.finish_send(pending, result)
    }

    /// Optimistically post to a session and wait for confirmation.
    pub async fn send_session_message(
        &mut self,
        session_id: SessionId,
        draft: MessageDraft,
    ) -> Result<Message, ClientError> {
        let pending = self.begin_session_send(session_id, draft);
        let result = self.api.send_message(session_id, pending.draft()).await;
        self.finish_send(pending, result)
    }

    /// Delete a session on the server and drop everything cached for it.
    pub async fn delete_session(&mut self, session_id: SessionId) -> Result<(), ClientError> {
        self.api.delete_session(session_id).await?;

        let pattern = Regex::new(&format!("^{}$", regex::escape(&messages_key(session_id))))?;
        self.messages.invalidate_pattern(&pattern);
        self.sessions.invalidate(SESSIONS_KEY);
        Ok(())
    }

    /// Drop all cached session data.
    pub fn clear_sessions(&mut self) {
        self.sessions.clear();
        self.messages.clear();
    }

    /// Route an inbound event into the caches, re-fetching members when
    /// membership of a cached room changed.
    pub async fn apply_event(&mut self, event: &ServerEvent) -> Result<RouteOutcome, ClientError> {
        let outcome = self.router.route(event, &mut self.rooms);

        match &outcome {
            RouteOutcome::RefetchMembers(room_id) => {
                self.refresh_members(*room_id).await?;
            },
            RouteOutcome::SessionMessage { session_id, message } => {
                self.apply_session_message(*session_id, message.clone());
            },
            _ => {},
        }
        Ok(outcome)
    }

    fn apply_session_message(&mut self, session_id: SessionId, message: Message) -> bool {
        if let Some(messages) = self.messages.get_mut(&messages_key(session_id)) {
            if messages.iter().any(|m| m.id == message.id) {
                return false;
            }
            let pending = messages
                .iter()
                .position(|m| message.is_own && m.id.is_local() && m.same_content(&message));
            match pending {
                Some(index) => messages[index] = message.clone(),
                None => messages.push(message.clone()),
            }
        }
        self.touch_session(session_id, &message);
        true
    }

    /// Refresh the listing entry of a session for a new message. An unknown
    /// session invalidates the listing.
    fn touch_session(&mut self, session_id: SessionId, message: &Message) {
        let known = match self.sessions.get_mut(SESSIONS_KEY) {
            Some(sessions) => match sessions.iter_mut().find(|s| s.id == session_id) {
                Some(session) => {
                    session.last_message = Some(message.preview());
                    if !message.is_own {
                        session.unread_count = session.unread_count.saturating_add(1);
                    }
                    true
                },
                None => false,
            },
            None => return,
        };

        if !known {
            self.sessions.invalidate(SESSIONS_KEY);
        }
    }
}

fn reconcile_in(messages: &mut Vec<Message>, local_id: &MessageId, persisted: Message) {
    let local = messages.iter().position(|m| &m.id == local_id);
    let confirmed = messages.iter().any(|m| m.id == persisted.id);

    match (local, confirmed) {
        (Some(index), false) => messages[index] = persisted,
        (Some(index), true) => {
            messages.remove(index);
        },
        (None, false) => messages.push(persisted),
        (None, true) => {},
    }
}

#[cfg(test)]
mod tests {
    use parley_cache::MessageDraft;

    use super::*;

    fn message(id: u64, content: &str) -> Message {
        let mut m = MessageDraft::text(content).into_local_message(MessageId::Server(id), 1);
        m.is_own = true;
        m
    }

    #[test]
    fn reconcile_replaces_local_in_place() {
        let local = MessageId::local(9);
        let mut messages = vec![
            message(1, "a"),
            MessageDraft::text("b").into_local_message(local.clone(), 1),
            message(3, "c"),
        ];

        reconcile_in(&mut messages, &local, message(2, "b"));

        let ids: Vec<_> = messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec![MessageId::Server(1), MessageId::Server(2), MessageId::Server(3)]);
    }

    #[test]
    fn reconcile_after_echo_drops_local() {
        let local = MessageId::local(9);
        let mut messages = vec![
            MessageDraft::text("b").into_local_message(local.clone(), 1),
            message(2, "b"),
        ];

        reconcile_in(&mut messages, &local, message(2, "b"));

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, MessageId::Server(2));
    }

    #[test]
    fn messages_key_format() {
        assert_eq!(messages_key(42), "messages_42");
    }
}
