//! Client configuration.

use std::time::Duration;

use parley_cache::RoomStoreConfig;
use parley_core::ConnectionConfig;

/// WebSocket endpoint used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8080/ws";

/// Lifetime of the cached session list.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60);

/// Lifetime of each cached per-session message list.
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(30);

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket endpoint
    pub server_url: String,
    /// Reconnection policy
    pub connection: ConnectionConfig,
    /// Room cache capacity and staleness
    pub rooms: RoomStoreConfig,
    /// TTL of the session list cache
    pub session_ttl: Duration,
    /// TTL of per-session message caches
    pub message_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            connection: ConnectionConfig::default(),
            rooms: RoomStoreConfig::default(),
            session_ttl: DEFAULT_SESSION_TTL,
            message_ttl: DEFAULT_MESSAGE_TTL,
        }
    }
}
