//! Fuzz target for the connection state machine
//!
//! # Strategy
//!
//! - Random interleavings of caller intents (connect, send, disconnect) and
//!   socket notifications (open, frames, close, timer), including
//!   notifications for sockets that are no longer current
//!
//! # Invariants
//!
//! - At most one socket is open from the driver's point of view
//! - Pending outbound is empty unless a handshake is in progress
//! - Reconnect attempts never exceed the configured maximum
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_core::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, InboundFrame,
    OutboundMessage, ServerEvent, SocketId,
};
use serde_json::json;

#[derive(Debug, Arbitrary)]
enum Op {
    Connect { token: Option<String> },
    Open { stale: bool },
    AuthSuccess { stale: bool },
    AuthError,
    Event { kind: String },
    Closed { stale: bool },
    Timer,
    Send { auth: bool },
    Disconnect,
}

/// Current socket, or the one before it. Socket IDs start at 1, so 0 is
/// never live.
fn target(conn: &Connection, stale: bool) -> SocketId {
    match conn.socket() {
        Some(socket) if stale => socket - 1,
        Some(socket) => socket,
        None => 0,
    }
}

fuzz_target!(|input: (u8, Vec<Op>)| {
    let (max_attempts, ops) = input;
    let config = ConnectionConfig {
        max_reconnect_attempts: u32::from(max_attempts % 8),
        ..ConnectionConfig::default()
    };
    let max = config.max_reconnect_attempts;
    let mut conn = Connection::new(config);
    let mut open: Vec<u64> = Vec::new();

    for op in ops {
        let actions = match op {
            Op::Connect { token } => conn.connect(token.as_deref()),
            Op::Open { stale } => {
                let socket = target(&conn, stale);
                conn.handle_open(socket)
            },
            Op::AuthSuccess { stale } => {
                let socket = target(&conn, stale);
                conn.handle_frame(socket, InboundFrame::AuthSuccess)
            },
            Op::AuthError => {
                let socket = target(&conn, false);
                conn.handle_frame(socket, InboundFrame::AuthError { message: String::new() })
            },
            Op::Event { kind } => {
                let socket = target(&conn, false);
                conn.handle_frame(socket, InboundFrame::Event(ServerEvent::new(kind, json!({}))))
            },
            Op::Closed { stale } => {
                let socket = target(&conn, stale);
                let actions = conn.handle_closed(socket, "fuzz");
                if !stale {
                    open.retain(|s| *s != socket);
                }
                actions
            },
            Op::Timer => conn.handle_reconnect_timer(Some("token")),
            Op::Send { auth } => {
                let message = if auth {
                    OutboundMessage::auth("token")
                } else {
                    OutboundMessage::new("chat", json!({}))
                };
                conn.send(message)
            },
            Op::Disconnect => conn.disconnect(),
        };

        for action in actions {
            match action {
                ConnectionAction::Open { socket } => open.push(socket),
                ConnectionAction::Close { socket, .. } => open.retain(|s| *s != socket),
                _ => {},
            }
        }

        assert!(open.len() <= 1);
        assert_eq!(open.first().copied(), conn.socket());
        if !matches!(conn.state(), ConnectionState::Connecting | ConnectionState::Authenticating) {
            assert_eq!(conn.pending_len(), 0);
        }
        assert!(conn.reconnect_attempts() <= max);
    }
});
