//! REST collaborator interface.
//!
//! The backend's HTTP contract is owned elsewhere; the client only needs
//! parsed bodies for the calls its caches wrap.

use async_trait::async_trait;
use parley_cache::{
    Member, Message, MessageDraft, RoomId, RoomMetadata, RoomSummary, Session, SessionId,
};
use thiserror::Error;

/// REST call failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Server answered with an error status
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Error body or reason phrase
        message: String,
    },

    /// Request did not reach the server
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not have the expected shape
    #[error("decode error: {0}")]
    Decode(String),
}

/// Backend REST endpoints used by [`crate::ChatStore`].
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Rooms visible to the current user.
    async fn get_rooms(&self) -> Result<Vec<RoomSummary>, ApiError>;

    /// Detail for one room.
    async fn get_room(&self, room_id: RoomId) -> Result<RoomMetadata, ApiError>;

    /// Message history of a room, oldest first.
    async fn get_room_messages(&self, room_id: RoomId) -> Result<Vec<Message>, ApiError>;

    /// Members of a room.
    async fn get_members(&self, room_id: RoomId) -> Result<Vec<Member>, ApiError>;

    /// Post a message to a room. Returns the persisted message.
    async fn send_room_message(
        &self,
        room_id: RoomId,
        draft: &MessageDraft,
    ) -> Result<Message, ApiError>;

    /// Direct-message sessions of the current user.
    async fn get_sessions(&self) -> Result<Vec<Session>, ApiError>;

    /// Message history of a session, oldest first.
    async fn get_messages(&self, session_id: SessionId) -> Result<Vec<Message>, ApiError>;

    /// Post a message to a session. Returns the persisted message.
    async fn send_message(
        &self,
        session_id: SessionId,
        draft: &MessageDraft,
    ) -> Result<Message, ApiError>;

    /// Delete a session and its history.
    async fn delete_session(&self, session_id: SessionId) -> Result<(), ApiError>;
}
