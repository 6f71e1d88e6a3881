//! Transport socket state machine.
//!
//! Manages the connection lifecycle: authentication handshake, outbound
//! queueing while authenticating, and reconnection with exponential backoff.
//! Uses the action pattern: methods take inputs and return actions for the
//! driver to execute. The state machine performs no I/O and owns no timers,
//! which keeps every transition testable without a network.
//!
//! # State Machine
//!
//! ```text
//!                  connect()                 socket opened / send auth
//! ┌──────────────┐ ─────────> ┌────────────┐ ─────────────────────────> ┌────────────────┐
//! │ Disconnected │            │ Connecting │                            │ Authenticating │
//! └──────────────┘ <───────── └────────────┘                            └────────────────┘
//!    ^    ^   ^     closed (reconnect scheduled)                           │          │
//!    │    │   └────────────────────────────────────────────── auth_error ─┘          │
//!    │    │                                                                          │ auth_success
//!    │    │  closed (reconnect scheduled)         ┌───────────┐                      │ (flush queue)
//!    │    └────────────────────────────────────── │ Connected │ <────────────────────┘
//!    │                                            └───────────┘
//!    └── disconnect() from any state
//! ```
//!
//! # Socket identity
//!
//! Every `Open` action carries a fresh [`SocketId`]. The driver tags each
//! socket notification with the ID it was opened under; notifications for any
//! other ID are stale and ignored. At most one socket is live at a time.

use std::{collections::VecDeque, time::Duration};

use crate::{
    error::ConnectionError,
    protocol::{InboundFrame, OutboundMessage, ServerEvent},
};

/// Delay before the first reconnect, doubled on every further attempt.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on the delay between reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Reconnect attempts allowed before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Identifies one underlying socket for the lifetime of the state machine.
pub type SocketId = u64;

/// Actions returned by the connection state machine.
///
/// The driver executes these in order:
/// - `Open`: Start connecting a new socket under the given ID
/// - `Close`: Tear down the socket with the given ID
/// - `Transmit`: Serialize and write the message on the socket
/// - `Deliver`: Hand the event to subscribers
/// - `ScheduleReconnect`: Arm the reconnect timer
/// - `CancelReconnect`: Disarm the reconnect timer
/// - `GiveUp`: Tell subscribers reconnection stopped
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionAction {
    /// Open a new socket
    Open {
        /// ID the driver must tag this socket's notifications with
        socket: SocketId,
    },

    /// Close an existing socket
    Close {
        /// Socket to close
        socket: SocketId,
        /// Reason for closing
        reason: String,
    },

    /// Write a message on the socket
    Transmit {
        /// Socket to write to
        socket: SocketId,
        /// Message to write
        message: OutboundMessage,
    },

    /// Forward an inbound event to subscribers
    Deliver(ServerEvent),

    /// Fire [`Connection::handle_reconnect_timer`] after `delay`
    ScheduleReconnect {
        /// 1-based attempt number this timer will start
        attempt: u32,
        /// How long to wait
        delay: Duration,
    },

    /// Drop any armed reconnect timer
    CancelReconnect,

    /// Reconnection stopped: attempts ran out, or no credential was
    /// available to retry with
    GiveUp {
        /// Attempts made before giving up
        attempts: u32,
    },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket
    Disconnected,
    /// Socket opening
    Connecting,
    /// Socket open, auth request sent, waiting for the verdict
    Authenticating,
    /// Authenticated; messages transmit immediately
    Connected,
}

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Base delay for exponential backoff
    pub reconnect_base_delay: Duration,
    /// Cap applied to every backoff delay
    pub max_reconnect_delay: Duration,
    /// Attempts allowed before giving up
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ConnectionConfig {
    /// Backoff delay for the given 1-based attempt: `min(base * 2^attempt,
    /// cap)`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.reconnect_base_delay.saturating_mul(factor).min(self.max_reconnect_delay)
    }
}

/// Transport socket state machine.
///
/// Owns the logical connection: which socket is live, whether it has
/// authenticated, which messages wait for authentication, and how many
/// reconnects have been attempted.
///
/// # Invariants
///
/// - At most one socket is live (`socket` is `Some`) at a time.
/// - `pending_outbound` is empty unless the state is `Connecting` or
///   `Authenticating`.
/// - `reconnect_attempts <= config.max_reconnect_attempts`.
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    config: ConnectionConfig,
    socket: Option<SocketId>,
    next_socket: SocketId,
    token: Option<String>,
    reconnect_attempts: u32,
    reconnect_pending: bool,
    pending_outbound: VecDeque<OutboundMessage>,
    last_error: Option<ConnectionError>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

impl Connection {
    /// Create a new connection in [`ConnectionState::Disconnected`] state
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            socket: None,
            next_socket: 1,
            token: None,
            reconnect_attempts: 0,
            reconnect_pending: false,
            pending_outbound: VecDeque::new(),
            last_error: None,
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Live socket, if any.
    #[must_use]
    pub fn socket(&self) -> Option<SocketId> {
        self.socket
    }

    /// Consecutive failed connection cycles since the last successful auth.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether a reconnect timer is armed.
    #[must_use]
    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Messages waiting for authentication to complete.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending_outbound.len()
    }

    /// Most recent reason the connection failed or refused to start.
    #[must_use]
    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    /// Reconnection configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Start connecting with the given credential.
    ///
    /// No-op while a connection is already in progress or established. Without
    /// a non-empty token the state stays `Disconnected` and the failure is
    /// recorded in [`Connection::last_error`].
    pub fn connect(&mut self, token: Option<&str>) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Disconnected {
            tracing::debug!(state = ?self.state, "connect ignored, connection already active");
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            actions.push(ConnectionAction::CancelReconnect);
        }

        match token.filter(|t| !t.is_empty()) {
            Some(token) => {
                self.token = Some(token.to_string());
                actions.extend(self.open_socket());
            },
            None => {
                tracing::warn!("no auth token available, staying disconnected");
                self.last_error = Some(ConnectionError::MissingCredential);
            },
        }

        actions
    }

    /// Reconnect timer fired.
    ///
    /// The token is fetched fresh by the driver since it may have been
    /// refreshed since the connection dropped. Without a token the retry
    /// loop ends with `GiveUp`, as if attempts were exhausted. Ignored if the
    /// timer was cancelled in the meantime.
    pub fn handle_reconnect_timer(&mut self, token: Option<&str>) -> Vec<ConnectionAction> {
        if !self.reconnect_pending || self.state != ConnectionState::Disconnected {
            tracing::debug!("stale reconnect timer ignored");
            return Vec::new();
        }
        self.reconnect_pending = false;

        tracing::info!(attempt = self.reconnect_attempts, "reconnecting");
        match token.filter(|t| !t.is_empty()) {
            Some(token) => {
                self.token = Some(token.to_string());
                self.open_socket()
            },
            None => {
                // Retrying cannot succeed until the caller re-authenticates
                let attempts = self.reconnect_attempts;
                tracing::warn!(attempts, "no auth token available for reconnect, giving up");
                self.reconnect_attempts = 0;
                self.last_error = Some(ConnectionError::MissingCredential);
                vec![ConnectionAction::GiveUp { attempts }]
            },
        }
    }

    /// The socket finished opening; sends the authentication request.
    pub fn handle_open(&mut self, socket: SocketId) -> Vec<ConnectionAction> {
        if self.socket != Some(socket) || self.state != ConnectionState::Connecting {
            tracing::debug!(socket, "open notification for stale socket ignored");
            return Vec::new();
        }

        let Some(token) = self.token.as_deref() else {
            // connect() never opens a socket without a token
            return vec![ConnectionAction::Close {
                socket,
                reason: "missing credential".to_string(),
            }];
        };

        self.state = ConnectionState::Authenticating;
        tracing::debug!(socket, "socket open, authenticating");

        vec![ConnectionAction::Transmit { socket, message: OutboundMessage::auth(token) }]
    }

    /// A frame arrived on the socket.
    pub fn handle_frame(&mut self, socket: SocketId, frame: InboundFrame) -> Vec<ConnectionAction> {
        if self.socket != Some(socket) {
            tracing::debug!(socket, "frame from stale socket ignored");
            return Vec::new();
        }

        match frame {
            InboundFrame::AuthSuccess => self.handle_auth_success(socket),
            InboundFrame::AuthError { message } => self.handle_auth_error(socket, message),
            InboundFrame::Event(event) => vec![ConnectionAction::Deliver(event)],
        }
    }

    /// The socket closed or failed to open.
    ///
    /// Treated as a transport failure: the state drops to `Disconnected` and a
    /// reconnect is scheduled, unless attempts are exhausted.
    pub fn handle_closed(&mut self, socket: SocketId, reason: &str) -> Vec<ConnectionAction> {
        if self.socket != Some(socket) {
            tracing::debug!(socket, "close notification for stale socket ignored");
            return Vec::new();
        }

        tracing::warn!(socket, state = ?self.state, reason, "socket closed");
        self.socket = None;
        self.state = ConnectionState::Disconnected;
        self.drop_pending("socket closed before authentication");
        self.last_error = Some(ConnectionError::Transport(reason.to_string()));

        self.schedule_reconnect()
    }

    /// Send a message to the server.
    ///
    /// Transmits immediately when `Connected`, queues while `Authenticating`,
    /// and drops with a warning otherwise. The authentication request always
    /// transmits immediately on a live socket.
    pub fn send(&mut self, message: OutboundMessage) -> Vec<ConnectionAction> {
        if message.is_auth() {
            return match self.socket {
                Some(socket) => vec![ConnectionAction::Transmit { socket, message }],
                None => {
                    tracing::warn!("auth message dropped, no socket");
                    Vec::new()
                },
            };
        }

        match (self.state, self.socket) {
            (ConnectionState::Connected, Some(socket)) => {
                vec![ConnectionAction::Transmit { socket, message }]
            },
            (ConnectionState::Authenticating, Some(_)) => {
                self.pending_outbound.push_back(message);
                Vec::new()
            },
            (state, _) => {
                tracing::warn!(?state, kind = message.kind(), "message dropped, not connected");
                Vec::new()
            },
        }
    }

    /// Tear everything down. No reconnect is scheduled and the next
    /// `connect()` starts from a clean state.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if let Some(socket) = self.socket.take() {
            actions.push(ConnectionAction::Close { socket, reason: "disconnect".to_string() });
        }
        if self.reconnect_pending {
            self.reconnect_pending = false;
            actions.push(ConnectionAction::CancelReconnect);
        }

        self.state = ConnectionState::Disconnected;
        self.reconnect_attempts = 0;
        self.pending_outbound.clear();
        self.token = None;

        tracing::debug!("disconnected");
        actions
    }

    fn handle_auth_success(&mut self, socket: SocketId) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Authenticating {
            tracing::warn!(state = ?self.state, "unexpected auth_success ignored");
            return Vec::new();
        }

        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        self.last_error = None;
        tracing::info!(socket, flushed = self.pending_outbound.len(), "connected");

        self.pending_outbound
            .drain(..)
            .map(|message| ConnectionAction::Transmit { socket, message })
            .collect()
    }

    fn handle_auth_error(&mut self, socket: SocketId, message: String) -> Vec<ConnectionAction> {
        tracing::error!(socket, reason = %message, "authentication rejected");

        self.socket = None;
        self.state = ConnectionState::Disconnected;
        self.reconnect_attempts = 0;
        self.drop_pending("authentication rejected");
        self.last_error = Some(ConnectionError::AuthRejected { message: message.clone() });

        vec![ConnectionAction::Close { socket, reason: format!("auth error: {message}") }]
    }

    fn open_socket(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if let Some(old) = self.socket.take() {
            actions.push(ConnectionAction::Close { socket: old, reason: "replaced".to_string() });
        }

        let socket = self.next_socket;
        self.next_socket += 1;
        self.socket = Some(socket);
        self.state = ConnectionState::Connecting;

        tracing::debug!(socket, "opening socket");
        actions.push(ConnectionAction::Open { socket });
        actions
    }

    fn schedule_reconnect(&mut self) -> Vec<ConnectionAction> {
        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            let attempts = self.reconnect_attempts;
            tracing::error!(attempts, "max reconnect attempts reached, giving up");

            self.reconnect_attempts = 0;
            self.last_error = Some(ConnectionError::ReconnectExhausted { attempts });
            return vec![ConnectionAction::GiveUp { attempts }];
        }

        self.reconnect_attempts += 1;
        self.reconnect_pending = true;
        let attempt = self.reconnect_attempts;
        let delay = self.config.reconnect_delay(attempt);

        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        vec![ConnectionAction::ScheduleReconnect { attempt, delay }]
    }

    fn drop_pending(&mut self, reason: &str) {
        if !self.pending_outbound.is_empty() {
            tracing::warn!(dropped = self.pending_outbound.len(), reason, "pending messages dropped");
            self.pending_outbound.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn open_socket(actions: &[ConnectionAction]) -> SocketId {
        actions
            .iter()
            .find_map(|a| match a {
                ConnectionAction::Open { socket } => Some(*socket),
                _ => None,
            })
            .expect("Open action")
    }

    /// Drive a fresh connection to `Authenticating`.
    fn authenticating() -> (Connection, SocketId) {
        let mut conn = Connection::default();
        let socket = open_socket(&conn.connect(Some("token")));
        conn.handle_open(socket);
        (conn, socket)
    }

    /// Drive a fresh connection to `Connected`.
    fn connected() -> (Connection, SocketId) {
        let (mut conn, socket) = authenticating();
        conn.handle_frame(socket, InboundFrame::AuthSuccess);
        (conn, socket)
    }

    fn chat(n: u32) -> OutboundMessage {
        OutboundMessage::new("chat", json!({ "n": n }))
    }

    #[test]
    fn connection_lifecycle() {
        let mut conn = Connection::default();
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let actions = conn.connect(Some("token"));
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(actions, vec![ConnectionAction::Open { socket: 1 }]);

        let actions = conn.handle_open(1);
        assert_eq!(conn.state(), ConnectionState::Authenticating);
        assert_eq!(actions, vec![ConnectionAction::Transmit {
            socket: 1,
            message: OutboundMessage::auth("token"),
        }]);

        let actions = conn.handle_frame(1, InboundFrame::AuthSuccess);
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(actions.is_empty());
        assert_eq!(conn.reconnect_attempts(), 0);
    }

    #[test]
    fn connect_is_idempotent_while_active() {
        let mut conn = Connection::default();
        conn.connect(Some("token"));
        assert!(conn.connect(Some("token")).is_empty());

        conn.handle_open(1);
        assert!(conn.connect(Some("token")).is_empty());

        conn.handle_frame(1, InboundFrame::AuthSuccess);
        assert!(conn.connect(Some("token")).is_empty());
        assert_eq!(conn.socket(), Some(1));
    }

    #[test]
    fn connect_without_token_stays_disconnected() {
        let mut conn = Connection::default();

        assert!(conn.connect(None).is_empty());
        assert!(conn.connect(Some("")).is_empty());

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.socket(), None);
        assert_eq!(conn.last_error(), Some(&ConnectionError::MissingCredential));
    }

    #[test]
    fn pending_messages_flush_in_order() {
        let (mut conn, socket) = authenticating();

        for n in 0..3 {
            assert!(conn.send(chat(n)).is_empty());
        }
        assert_eq!(conn.pending_len(), 3);

        let actions = conn.handle_frame(socket, InboundFrame::AuthSuccess);
        assert_eq!(actions, vec![
            ConnectionAction::Transmit { socket, message: chat(0) },
            ConnectionAction::Transmit { socket, message: chat(1) },
            ConnectionAction::Transmit { socket, message: chat(2) },
        ]);
        assert_eq!(conn.pending_len(), 0);
    }

    #[test]
    fn send_while_connected_transmits_immediately() {
        let (mut conn, socket) = connected();
        assert_eq!(conn.send(chat(1)), vec![ConnectionAction::Transmit { socket, message: chat(1) }]);
    }

    #[test]
    fn send_while_disconnected_or_connecting_drops() {
        let mut conn = Connection::default();
        assert!(conn.send(chat(1)).is_empty());

        conn.connect(Some("token"));
        assert!(conn.send(chat(2)).is_empty());
        assert_eq!(conn.pending_len(), 0);
    }

    #[test]
    fn auth_message_bypasses_queue() {
        let (mut conn, socket) = authenticating();
        let actions = conn.send(OutboundMessage::auth("fresh"));
        assert_eq!(actions, vec![ConnectionAction::Transmit {
            socket,
            message: OutboundMessage::auth("fresh"),
        }]);
        assert_eq!(conn.pending_len(), 0);
    }

    #[test]
    fn events_are_delivered_but_auth_frames_are_not() {
        let (mut conn, socket) = authenticating();
        let event = ServerEvent::new("user_online", json!({"type": "user_online", "user_id": 1}));

        let actions = conn.handle_frame(socket, InboundFrame::AuthSuccess);
        assert!(actions.iter().all(|a| !matches!(a, ConnectionAction::Deliver(_))));

        let actions = conn.handle_frame(socket, InboundFrame::Event(event.clone()));
        assert_eq!(actions, vec![ConnectionAction::Deliver(event)]);
    }

    #[test]
    fn auth_error_is_fatal() {
        let (mut conn, socket) = authenticating();
        conn.send(chat(1));

        let actions =
            conn.handle_frame(socket, InboundFrame::AuthError { message: "expired".to_string() });

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.socket(), None);
        assert_eq!(conn.pending_len(), 0);
        assert!(!conn.is_reconnect_pending());
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], ConnectionAction::Close { socket: s, .. } if s == socket));
        assert!(matches!(conn.last_error(), Some(ConnectionError::AuthRejected { .. })));
    }

    #[test]
    fn close_while_connected_schedules_reconnect() {
        let (mut conn, socket) = connected();

        let actions = conn.handle_closed(socket, "server restart");

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(actions, vec![ConnectionAction::ScheduleReconnect {
            attempt: 1,
            delay: Duration::from_millis(2000),
        }]);
        assert!(conn.is_reconnect_pending());

        let actions = conn.handle_reconnect_timer(Some("token"));
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(actions, vec![ConnectionAction::Open { socket: socket + 1 }]);
    }

    #[test]
    fn backoff_grows_then_gives_up() {
        let mut conn = Connection::default();
        conn.connect(Some("token"));

        let mut delays = Vec::new();
        let mut gave_up = false;
        for _ in 0..6 {
            let socket = conn.socket().expect("live socket");
            for action in conn.handle_closed(socket, "network down") {
                match action {
                    ConnectionAction::ScheduleReconnect { delay, .. } => {
                        delays.push(delay.as_millis());
                        conn.handle_reconnect_timer(Some("token"));
                    },
                    ConnectionAction::GiveUp { attempts } => {
                        assert_eq!(attempts, 5);
                        gave_up = true;
                    },
                    other => panic!("unexpected action {other:?}"),
                }
            }
        }

        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30000]);
        assert!(gave_up);
        assert!(!conn.is_reconnect_pending());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn successful_auth_resets_attempts() {
        let (mut conn, socket) = connected();
        conn.handle_closed(socket, "blip");
        let socket = open_socket(&conn.handle_reconnect_timer(Some("token")));
        assert_eq!(conn.reconnect_attempts(), 1);

        conn.handle_open(socket);
        conn.handle_frame(socket, InboundFrame::AuthSuccess);
        assert_eq!(conn.reconnect_attempts(), 0);
    }

    #[test]
    fn reconnect_without_token_gives_up() {
        let (mut conn, socket) = connected();
        conn.handle_closed(socket, "server restart");

        let actions = conn.handle_reconnect_timer(None);

        assert_eq!(actions, vec![ConnectionAction::GiveUp { attempts: 1 }]);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.reconnect_attempts(), 0);
        assert!(!conn.is_reconnect_pending());
        assert_eq!(conn.last_error(), Some(&ConnectionError::MissingCredential));

        // A fresh token and an explicit connect start over
        assert_eq!(conn.connect(Some("token")), vec![ConnectionAction::Open { socket: socket + 1 }]);
    }

    #[test]
    fn close_during_handshake_drops_queue_and_retries() {
        let (mut conn, socket) = authenticating();
        conn.send(chat(1));

        let actions = conn.handle_closed(socket, "reset");
        assert_eq!(conn.pending_len(), 0);
        assert!(matches!(actions[0], ConnectionAction::ScheduleReconnect { attempt: 1, .. }));
    }

    #[test]
    fn disconnect_cancels_everything() {
        let (mut conn, socket) = connected();
        conn.handle_closed(socket, "blip");
        assert!(conn.is_reconnect_pending());

        let actions = conn.disconnect();
        assert_eq!(actions, vec![ConnectionAction::CancelReconnect]);
        assert_eq!(conn.reconnect_attempts(), 0);
        assert!(!conn.is_reconnect_pending());

        // A timer that raced the cancellation does nothing
        assert!(conn.handle_reconnect_timer(Some("token")).is_empty());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_closes_live_socket() {
        let (mut conn, socket) = authenticating();
        conn.send(chat(1));

        let actions = conn.disconnect();
        assert_eq!(actions, vec![ConnectionAction::Close {
            socket,
            reason: "disconnect".to_string()
        }]);
        assert_eq!(conn.pending_len(), 0);
        assert_eq!(conn.socket(), None);
    }

    #[test]
    fn explicit_connect_cancels_pending_reconnect() {
        let (mut conn, socket) = connected();
        conn.handle_closed(socket, "blip");

        let actions = conn.connect(Some("token"));
        assert_eq!(actions[0], ConnectionAction::CancelReconnect);
        assert!(matches!(actions[1], ConnectionAction::Open { .. }));
        assert!(!conn.is_reconnect_pending());
        assert_eq!(conn.reconnect_attempts(), 1);
    }

    #[test]
    fn stale_socket_notifications_are_ignored() {
        let (mut conn, old) = connected();
        conn.handle_closed(old, "blip");
        let new = open_socket(&conn.handle_reconnect_timer(Some("token")));

        assert!(conn.handle_open(old).is_empty());
        assert!(conn.handle_closed(old, "late").is_empty());
        assert!(conn.handle_frame(old, InboundFrame::AuthSuccess).is_empty());
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(conn.socket(), Some(new));
    }

    #[test]
    fn reconnect_delay_saturates() {
        let config = ConnectionConfig::default();
        assert_eq!(config.reconnect_delay(0), Duration::from_millis(1000));
        assert_eq!(config.reconnect_delay(1), Duration::from_millis(2000));
        assert_eq!(config.reconnect_delay(4), Duration::from_millis(16000));
        assert_eq!(config.reconnect_delay(5), Duration::from_secs(30));
        assert_eq!(config.reconnect_delay(64), Duration::from_secs(30));
    }
}
