//! In-memory REST backend.
//!
//! Implements [`ChatApi`] over plain collections so store tests can seed
//! server state, count calls, and inject failures.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use parley_cache::{
    Member, Message, MessageDraft, MessageId, RoomId, RoomMetadata, RoomSummary, Session,
    SessionId, UserId,
};
use parley_client::{ApiError, ChatApi};

/// First ID handed out for persisted messages.
const FIRST_MESSAGE_ID: u64 = 1000;

#[derive(Debug, Default)]
struct Backend {
    rooms: Vec<RoomMetadata>,
    room_messages: HashMap<RoomId, Vec<Message>>,
    members: HashMap<RoomId, Vec<Member>>,
    sessions: Vec<Session>,
    session_messages: HashMap<SessionId, Vec<Message>>,
    next_message_id: u64,
    calls: HashMap<&'static str, usize>,
    fail_next: Option<ApiError>,
}

impl Backend {
    fn persist(&mut self, sender_id: UserId, draft: &MessageDraft) -> Message {
        let id = FIRST_MESSAGE_ID + self.next_message_id;
        self.next_message_id += 1;

        let mut message = draft.clone().into_local_message(MessageId::Server(id), sender_id);
        // The server does not know who is asking
        message.is_own = false;
        message
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::Status { status: 404, message: format!("{what} not found") }
}

/// Fake backend for the logged-in user `current_user`.
#[derive(Debug)]
pub struct MockChatApi {
    current_user: UserId,
    backend: Mutex<Backend>,
}

impl MockChatApi {
    /// Empty backend.
    pub fn new(current_user: UserId) -> Self {
        Self { current_user, backend: Mutex::new(Backend::default()) }
    }

    /// Create a room.
    pub fn add_room(&self, room: RoomMetadata) {
        self.lock().rooms.push(room);
    }

    /// Append a persisted message to a room's history.
    pub fn add_room_message(&self, room_id: RoomId, message: Message) {
        self.lock().room_messages.entry(room_id).or_default().push(message);
    }

    /// Replace a room's member set.
    pub fn set_members(&self, room_id: RoomId, members: Vec<Member>) {
        self.lock().members.insert(room_id, members);
    }

    /// Create a direct-message session.
    pub fn add_session(&self, session: Session) {
        self.lock().sessions.push(session);
    }

    /// Append a persisted message to a session's history.
    pub fn add_session_message(&self, session_id: SessionId, message: Message) {
        self.lock().session_messages.entry(session_id).or_default().push(message);
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: ApiError) {
        self.lock().fail_next = Some(error);
    }

    /// How many times `endpoint` (the [`ChatApi`] method name) was called.
    pub fn calls(&self, endpoint: &str) -> usize {
        self.lock().calls.get(endpoint).copied().unwrap_or(0)
    }

    /// Server-side history of a room.
    pub fn room_history(&self, room_id: RoomId) -> Vec<Message> {
        self.lock().room_messages.get(&room_id).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, endpoint: &'static str) -> Result<MutexGuard<'_, Backend>, ApiError> {
        let mut backend = self.lock();
        *backend.calls.entry(endpoint).or_default() += 1;

        if let Some(error) = backend.fail_next.take() {
            tracing::debug!(endpoint, %error, "injected api failure");
            return Err(error);
        }
        Ok(backend)
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn get_rooms(&self) -> Result<Vec<RoomSummary>, ApiError> {
        let backend = self.enter("get_rooms")?;
        Ok(backend
            .rooms
            .iter()
            .map(|room| RoomSummary {
                id: room.id,
                name: room.name.clone(),
                unread_count: 0,
                last_message: backend
                    .room_messages
                    .get(&room.id)
                    .and_then(|messages| messages.last())
                    .map(Message::preview),
            })
            .collect())
    }

    async fn get_room(&self, room_id: RoomId) -> Result<RoomMetadata, ApiError> {
        let backend = self.enter("get_room")?;
        backend.rooms.iter().find(|r| r.id == room_id).cloned().ok_or_else(|| not_found("room"))
    }

    async fn get_room_messages(&self, room_id: RoomId) -> Result<Vec<Message>, ApiError> {
        let backend = self.enter("get_room_messages")?;
        Ok(backend.room_messages.get(&room_id).cloned().unwrap_or_default())
    }

    async fn get_members(&self, room_id: RoomId) -> Result<Vec<Member>, ApiError> {
        let backend = self.enter("get_members")?;
        Ok(backend.members.get(&room_id).cloned().unwrap_or_default())
    }

    async fn send_room_message(
        &self,
        room_id: RoomId,
        draft: &MessageDraft,
    ) -> Result<Message, ApiError> {
        let mut backend = self.enter("send_room_message")?;
        if !backend.rooms.iter().any(|r| r.id == room_id) {
            return Err(not_found("room"));
        }
        let message = backend.persist(self.current_user, draft);
        backend.room_messages.entry(room_id).or_default().push(message.clone());
        Ok(message)
    }

    async fn get_sessions(&self) -> Result<Vec<Session>, ApiError> {
        let backend = self.enter("get_sessions")?;
        Ok(backend.sessions.clone())
    }

    async fn get_messages(&self, session_id: SessionId) -> Result<Vec<Message>, ApiError> {
        let backend = self.enter("get_messages")?;
        Ok(backend.session_messages.get(&session_id).cloned().unwrap_or_default())
    }

    async fn send_message(
        &self,
        session_id: SessionId,
        draft: &MessageDraft,
    ) -> Result<Message, ApiError> {
        let mut backend = self.enter("send_message")?;
        if !backend.sessions.iter().any(|s| s.id == session_id) {
            return Err(not_found("session"));
        }
        let message = backend.persist(self.current_user, draft);
        backend.session_messages.entry(session_id).or_default().push(message.clone());
        Ok(message)
    }

    async fn delete_session(&self, session_id: SessionId) -> Result<(), ApiError> {
        let mut backend = self.enter("delete_session")?;
        let before = backend.sessions.len();
        backend.sessions.retain(|s| s.id != session_id);
        if backend.sessions.len() == before {
            return Err(not_found("session"));
        }
        backend.session_messages.remove(&session_id);
        Ok(())
    }
}
