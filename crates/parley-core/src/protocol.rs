//! JSON wire protocol spoken over the duplex connection.
//!
//! Every frame in either direction is a JSON object with a string `type`
//! discriminator. Two inbound kinds (`auth_success`, `auth_error`) drive the
//! connection state machine and are never shown to subscribers; everything
//! else is carried verbatim as a [`ServerEvent`].

use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Event kind discriminators observed on the wire.
pub mod kind {
    /// Outbound authentication request.
    pub const AUTH: &str = "auth";
    /// Server accepted the auth token.
    pub const AUTH_SUCCESS: &str = "auth_success";
    /// Server rejected the auth token.
    pub const AUTH_ERROR: &str = "auth_error";
    /// A message was posted to a room.
    pub const NEW_MESSAGE: &str = "new_message";
    /// A user joined a room.
    pub const USER_JOINED_ROOM: &str = "user_joined_room";
    /// A user left a room.
    pub const USER_LEFT_ROOM: &str = "user_left_room";
    /// A reaction was added to a message.
    pub const MESSAGE_REACTED: &str = "message_reacted";
    /// A reaction was removed from a message.
    pub const REACTION_REMOVED: &str = "reaction_removed";
    /// A room was created.
    pub const ROOM_CREATED: &str = "room_created";
    /// A room was deleted.
    pub const ROOM_DELETED: &str = "room_deleted";
    /// A message was marked read.
    pub const MESSAGE_READ: &str = "message_read";
    /// A user came online.
    pub const USER_ONLINE: &str = "user_online";
    /// A user went offline.
    pub const USER_OFFLINE: &str = "user_offline";
}

/// A message the client sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage(Value);

impl OutboundMessage {
    /// Authentication request carrying the bearer token.
    pub fn auth(token: &str) -> Self {
        let mut body = Map::new();
        body.insert("type".to_string(), Value::String(kind::AUTH.to_string()));
        body.insert("token".to_string(), Value::String(token.to_string()));
        Self(Value::Object(body))
    }

    /// Message of the given kind. Object payload fields are merged next to the
    /// discriminator; any other payload is carried under `data`.
    pub fn new(kind: &str, payload: Value) -> Self {
        let mut body = match payload {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => {
                let mut fields = Map::new();
                fields.insert("data".to_string(), other);
                fields
            },
        };
        body.insert("type".to_string(), Value::String(kind.to_string()));
        Self(Value::Object(body))
    }

    /// Wraps an arbitrary JSON value without inspecting it.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// The `type` discriminator, if present.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// Whether this is the authentication request, which bypasses queueing.
    pub fn is_auth(&self) -> bool {
        self.kind() == Some(kind::AUTH)
    }

    /// JSON body.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Serialized JSON text for the wire.
    pub fn to_text(&self) -> String {
        self.0.to_string()
    }
}

/// An inbound event forwarded verbatim to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    kind: String,
    body: Value,
}

impl ServerEvent {
    /// Builds an event from its kind and full JSON body.
    pub fn new(kind: impl Into<String>, body: Value) -> Self {
        Self { kind: kind.into(), body }
    }

    /// The `type` discriminator.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Full JSON body, including the discriminator.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Consumes the event, returning its JSON body.
    pub fn into_body(self) -> Value {
        self.body
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Server accepted our token.
    AuthSuccess,

    /// Server rejected our token.
    AuthError {
        /// Reason given by the server (empty if none)
        message: String,
    },

    /// Any other event.
    Event(ServerEvent),
}

impl InboundFrame {
    /// Parses frame text received from the socket.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the text is not JSON
    /// - `ProtocolError::NotAnObject` if the JSON is not an object
    /// - `ProtocolError::MissingType` if there is no string `type` field
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Classifies an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`InboundFrame::parse`], minus `Malformed`.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Some(fields) = value.as_object() else {
            return Err(ProtocolError::NotAnObject);
        };

        let Some(event_kind) = fields.get("type").and_then(Value::as_str) else {
            return Err(ProtocolError::MissingType);
        };

        match event_kind {
            kind::AUTH_SUCCESS => Ok(Self::AuthSuccess),
            kind::AUTH_ERROR => {
                let message =
                    fields.get("message").and_then(Value::as_str).unwrap_or_default().to_string();
                Ok(Self::AuthError { message })
            },
            other => {
                let other = other.to_string();
                Ok(Self::Event(ServerEvent::new(other, value)))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn auth_message_shape() {
        let msg = OutboundMessage::auth("secret");
        assert!(msg.is_auth());
        assert_eq!(msg.as_value(), &json!({"type": "auth", "token": "secret"}));
    }

    #[test]
    fn new_merges_object_payload() {
        let msg = OutboundMessage::new("typing", json!({"room_id": 7}));
        assert_eq!(msg.kind(), Some("typing"));
        assert_eq!(msg.as_value()["room_id"], json!(7));
        assert!(!msg.is_auth());
    }

    #[test]
    fn new_wraps_scalar_payload() {
        let msg = OutboundMessage::new("ping", json!(42));
        assert_eq!(msg.as_value(), &json!({"type": "ping", "data": 42}));
    }

    #[test]
    fn parse_control_frames() {
        assert_eq!(InboundFrame::parse(r#"{"type":"auth_success"}"#), Ok(InboundFrame::AuthSuccess));
        assert_eq!(
            InboundFrame::parse(r#"{"type":"auth_error","message":"expired"}"#),
            Ok(InboundFrame::AuthError { message: "expired".to_string() })
        );
        assert_eq!(
            InboundFrame::parse(r#"{"type":"auth_error"}"#),
            Ok(InboundFrame::AuthError { message: String::new() })
        );
    }

    #[test]
    fn parse_forwards_other_events_verbatim() {
        let text = r#"{"type":"user_online","user_id":3,"extra":[1,2]}"#;
        let Ok(InboundFrame::Event(event)) = InboundFrame::parse(text) else {
            panic!("expected event");
        };
        assert_eq!(event.kind(), kind::USER_ONLINE);
        assert_eq!(event.body(), &json!({"type": "user_online", "user_id": 3, "extra": [1, 2]}));
    }

    #[test]
    fn parse_rejects_bad_frames() {
        assert!(matches!(InboundFrame::parse("not json"), Err(ProtocolError::Malformed(_))));
        assert_eq!(InboundFrame::parse("[1,2]"), Err(ProtocolError::NotAnObject));
        assert_eq!(InboundFrame::parse(r#"{"type":5}"#), Err(ProtocolError::MissingType));
        assert_eq!(InboundFrame::parse("{}"), Err(ProtocolError::MissingType));
    }
}
