//! Log output of the connection state machine
//!
//! Failures that are not returned to the caller (missing credential, dropped
//! sends) must still be visible as warnings.

use std::{
    io,
    sync::{Arc, Mutex},
};

use parley_core::{Connection, ConnectionState, InboundFrame, OutboundMessage};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Shared buffer the subscriber writes formatted events into.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with WARN-and-above events captured, returning the log text.
fn warnings(f: impl FnOnce()) -> String {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_max_level(Level::WARN)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    capture.contents()
}

#[test]
fn connect_without_token_warns() {
    let mut conn = Connection::default();

    let log = warnings(|| {
        assert!(conn.connect(None).is_empty());
    });

    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(log.contains("WARN"), "log: {log}");
    assert!(log.contains("no auth token available"), "log: {log}");
}

#[test]
fn dropped_send_warns() {
    let mut conn = Connection::default();

    let log = warnings(|| {
        assert!(conn.send(OutboundMessage::new("chat", json!({}))).is_empty());
    });

    assert!(log.contains("message dropped, not connected"), "log: {log}");
    assert!(log.contains("chat"), "log: {log}");
}

#[test]
fn successful_handshake_is_quiet() {
    let mut conn = Connection::default();

    let log = warnings(|| {
        conn.connect(Some("token"));
        conn.handle_open(1);
        conn.handle_frame(1, InboundFrame::AuthSuccess);
    });

    assert_eq!(conn.state(), ConnectionState::Connected);
    assert!(log.is_empty(), "log: {log}");
}
