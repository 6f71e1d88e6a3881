//! Domain types held by the caches.
//!
//! These mirror the JSON bodies returned by the backend's REST endpoints and
//! carried in real-time events. Fields the client never inspects are not
//! modelled.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Room identifier.
pub type RoomId = u64;

/// User identifier.
pub type UserId = u64;

/// Direct-message session identifier.
pub type SessionId = u64;

/// Message identifier.
///
/// Messages start with a client-assigned [`MessageId::Local`] ID while the send
/// is in flight and are replaced by the server-assigned ID once persisted. The
/// server may assign numeric ([`MessageId::Server`]) or string
/// ([`MessageId::Key`]) IDs.
///
/// Deserialization never yields `Local`: anything read from the wire was
/// assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum MessageId {
    /// Numeric ID assigned by the server.
    Server(u64),
    /// String ID assigned by the server.
    Key(String),
    /// Assigned by this client before the server confirmed the message.
    Local(String),
}

impl MessageId {
    /// Local ID derived from a random seed.
    pub fn local(seed: u64) -> Self {
        Self::Local(format!("local-{seed:016x}"))
    }

    /// Whether the server has not assigned this ID yet.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Number(u64),
            Text(String),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Number(id) => Self::Server(id),
            Wire::Text(id) => Self::Key(id),
        })
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Key(id) | Self::Local(id) => f.write_str(id),
        }
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self::Server(id)
    }
}

/// Message content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    Text,
    /// Image attachment.
    Image,
    /// Animated GIF.
    Gif,
    /// Voice recording.
    Audio,
}

impl MessageKind {
    /// Fixed preview label for media kinds, `None` for text.
    pub fn preview_label(self) -> Option<&'static str> {
        match self {
            Self::Text => None,
            Self::Image => Some("Photo"),
            Self::Gif => Some("GIF"),
            Self::Audio => Some("Voice message"),
        }
    }
}

/// Emoji reaction left by a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reaction {
    /// Who reacted.
    pub user_id: UserId,
    /// Reaction emoji.
    pub emoji: String,
}

/// A chat message in a room or session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server or local ID.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Text body, or media URL for media kinds.
    #[serde(default)]
    pub content: String,
    /// Content type.
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Caption for media messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Message this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    /// Sent by the current user.
    #[serde(default)]
    pub is_own: bool,
    /// Seen by the recipient.
    #[serde(default)]
    pub read: bool,
    /// Reactions, in the order they were added.
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// Text shown in room and session listings for this message.
    ///
    /// A caption wins over the media label; text messages show their content.
    pub fn preview(&self) -> String {
        if let Some(caption) = self.caption.as_deref().filter(|c| !c.is_empty()) {
            return caption.to_string();
        }
        match self.kind.preview_label() {
            Some(label) => label.to_string(),
            None => self.content.clone(),
        }
    }

    /// Whether `other` carries the same authored content, ignoring IDs and
    /// delivery state. Used to match a server echo to a pending local send.
    pub fn same_content(&self, other: &Self) -> bool {
        self.sender_id == other.sender_id
            && self.kind == other.kind
            && self.content == other.content
            && self.caption == other.caption
    }
}

/// What the user composed, before it becomes a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageDraft {
    /// Text body or media URL.
    pub content: String,
    /// Content type.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Caption for media messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Message being replied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}

impl MessageDraft {
    /// Plain text draft.
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), ..Self::default() }
    }

    /// Optimistic message for this draft under a local ID.
    pub fn into_local_message(self, id: MessageId, sender_id: UserId) -> Message {
        Message {
            id,
            sender_id,
            content: self.content,
            kind: self.kind,
            caption: self.caption,
            reply_to: self.reply_to,
            is_own: true,
            read: false,
            reactions: Vec::new(),
        }
    }
}

/// Shallow update to a [`Message`]. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessagePatch {
    /// Replacement ID.
    pub id: Option<MessageId>,
    /// Replacement content.
    pub content: Option<String>,
    /// Replacement caption.
    pub caption: Option<String>,
    /// Replacement read flag.
    pub read: Option<bool>,
    /// Replacement reaction list.
    pub reactions: Option<Vec<Reaction>>,
}

impl MessagePatch {
    /// Patch that only sets the read flag.
    pub fn read(read: bool) -> Self {
        Self { read: Some(read), ..Self::default() }
    }

    /// Patch that only replaces the reaction list.
    pub fn reactions(reactions: Vec<Reaction>) -> Self {
        Self { reactions: Some(reactions), ..Self::default() }
    }

    /// Merge into `message`.
    pub fn apply(self, message: &mut Message) {
        if let Some(id) = self.id {
            message.id = id;
        }
        if let Some(content) = self.content {
            message.content = content;
        }
        if let Some(caption) = self.caption {
            message.caption = Some(caption);
        }
        if let Some(read) = self.read {
            message.read = read;
        }
        if let Some(reactions) = self.reactions {
            message.reactions = reactions;
        }
    }
}

/// A room member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member's user ID.
    pub user_id: UserId,
    /// Display name.
    #[serde(default)]
    pub username: String,
    /// Moderation role, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Room detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMetadata {
    /// Room ID.
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Invite-only room.
    #[serde(default)]
    pub is_private: bool,
    /// Creator, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
}

/// Entry in the top-level room listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    /// Room ID.
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Messages not yet seen by the current user.
    #[serde(default)]
    pub unread_count: u32,
    /// Preview of the most recent message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}

/// Shallow update to a [`RoomSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomSummaryPatch {
    /// Replacement name.
    pub name: Option<String>,
    /// Replacement unread count.
    pub unread_count: Option<u32>,
    /// Replacement preview.
    pub last_message: Option<String>,
}

impl RoomSummaryPatch {
    /// Merge into `summary`.
    pub fn apply(self, summary: &mut RoomSummary) {
        if let Some(name) = self.name {
            summary.name = name;
        }
        if let Some(unread_count) = self.unread_count {
            summary.unread_count = unread_count;
        }
        if let Some(last_message) = self.last_message {
            summary.last_message = Some(last_message);
        }
    }
}

/// Shallow update to a cached room. Fields left `None` keep their cached
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomPatch {
    /// Replacement room detail.
    pub room: Option<RoomMetadata>,
    /// Replacement message sequence.
    pub messages: Option<Vec<Message>>,
    /// Replacement member set.
    pub members: Option<Vec<Member>>,
}

impl RoomPatch {
    /// Set room detail.
    #[must_use]
    pub fn with_room(mut self, room: RoomMetadata) -> Self {
        self.room = Some(room);
        self
    }

    /// Set the message sequence.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Set the member set.
    #[must_use]
    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.members = Some(members);
        self
    }
}

/// A direct-message session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session ID.
    pub id: SessionId,
    /// The other participant.
    pub peer_id: UserId,
    /// The other participant's display name.
    #[serde(default)]
    pub peer_name: String,
    /// Preview of the most recent message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Messages not yet seen by the current user.
    #[serde(default)]
    pub unread_count: u32,
}
