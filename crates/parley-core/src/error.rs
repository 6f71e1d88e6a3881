//! Error types for the Parley core.
//!
//! Protocol errors describe inbound frames that cannot be interpreted.
//! Connection errors describe why the transport is not (or no longer) usable;
//! the state machine records them for observability rather than returning them,
//! since callers are allowed to probe `connect()` opportunistically.

use thiserror::Error;

/// Errors raised while decoding inbound frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame text was not valid JSON
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Frame was valid JSON but not an object
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// Frame object carried no string `type` discriminator
    #[error("frame has no `type` discriminator")]
    MissingType,
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Reasons the connection state machine stopped or refused to connect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// `connect()` was called without a usable credential
    #[error("no auth token available")]
    MissingCredential,

    /// Server rejected the auth token
    #[error("authentication rejected: {message}")]
    AuthRejected {
        /// Reason reported by the server
        message: String,
    },

    /// Underlying socket failed or was closed by the peer
    #[error("transport error: {0}")]
    Transport(String),

    /// Reconnect attempts exhausted
    #[error("gave up after {attempts} reconnect attempts")]
    ReconnectExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Inbound frame could not be decoded
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ConnectionError {
    /// Returns true if this error is transient and the connection will retry
    /// on its own.
    ///
    /// Auth rejections and exhausted retries require the caller to intervene
    /// with a fresh credential and an explicit `connect()`.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        assert!(ConnectionError::Transport("reset by peer".to_string()).is_transient());
        assert!(ConnectionError::Protocol(ProtocolError::MissingType).is_transient());
    }

    #[test]
    fn auth_and_exhaustion_are_fatal() {
        assert!(!ConnectionError::MissingCredential.is_transient());
        assert!(!ConnectionError::AuthRejected { message: "expired".to_string() }.is_transient());
        assert!(!ConnectionError::ReconnectExhausted { attempts: 5 }.is_transient());
    }

    #[test]
    fn json_errors_map_to_malformed() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(ProtocolError::from(err), ProtocolError::Malformed(_)));
    }
}
